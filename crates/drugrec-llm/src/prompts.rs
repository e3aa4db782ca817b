//! Prompt templates for the completion oracle.
//!
//! Two modes share one oracle: symptom narration (fill the `XX` slot of a
//! pipe-delimited patient line) and record auditing (classify inconsistencies
//! in a full record line). Each request renders a canonical input line, which
//! doubles as the call-cache key.

use serde::{Deserialize, Serialize};

/// Field separator used by both prompt modes.
pub const SPLITTER: &str = " || ";

/// Placeholder the oracle must replace with a symptom narrative.
pub const SYMPTOM_SLOT: &str = "XX";

/// Rendered in place of an empty history list.
pub const NO_HISTORY: &str = "无既往病史";

/// Instruction header for symptom narration.
pub const SYMPTOM_INSTRUCTIONS: &str = r#"根据病人信息与诊断补全主诉症状。输入格式为:年龄 || 性别 || 人群类别 || XX || 诊断。
只把 XX 替换为主诉症状(多个症状用顿号分隔),其余字段原样保留,不要输出其他内容。"#;

/// Few-shot examples for symptom narration: (input line, expected output line).
pub const SYMPTOM_EXAMPLES: &[(&str, &str)] = &[
    (
        "35 || 男 || 成人 || XX || 呼吸道感染",
        "35 || 男 || 成人 || 咳嗽、咳痰、发热 || 呼吸道感染",
    ),
    (
        "29 || 女 || 成人 || XX || 尿路感染",
        "29 || 女 || 成人 || 尿频、尿急、尿痛 || 尿路感染",
    ),
    (
        "7 || 女 || 儿童 || XX || 消化不良",
        "7 || 女 || 儿童 || 食欲不振、腹胀、腹泻 || 消化不良",
    ),
    (
        "67 || 男 || 老年人 || XX || 高血压",
        "67 || 男 || 老年人 || 头晕、心悸、胸闷 || 高血压",
    ),
    (
        "70 || 男 || 老年人,肾功能不全 || XX || 骨质疏松症",
        "70 || 男 || 老年人,肾功能不全 || 腰背疼痛、易骨折 || 骨质疏松症",
    ),
];

/// Instruction header for record auditing.
pub const AUDIT_INSTRUCTIONS: &str = r#"你是一名临床医生,请检查下面的病历是否自相矛盾。
病历格式:年龄 || 人群 || 性别 || 症状 || 疾病 || 既往病史
错误类型:
1. 疾病与性别不符
2. 疾病与年龄不符
3. 疾病与症状不符
4. 疾病描述不规范
5. 既往病史与性别不符
6. 既往病史与年龄不符
7. 既往病史描述不规范
没有错误时输出 0。多个错误用逗号分隔。
输出格式 -> 输出: 错误编号"#;

/// Few-shot examples for record auditing: (input line, expected code).
pub const AUDIT_EXAMPLES: &[(&str, &str)] = &[
    ("80 || 老年人 || 女 || 月经不调,经血颜色改变 || 经色紫暗 || 无既往病史", "2"),
    ("41 || 成人 || 男 || 避孕咨询,焦虑 || 女性避孕 || 重度持续性哮喘", "1"),
    ("29 || 成人 || 男 || 头皮瘙痒,鳞屑增多 || 头皮鳞屑 || 盆腔炎", "5"),
    ("53 || 成人 || 男 || 右上腹痛,乏力,食欲不振 || 肝功能不正常 || 疾病", "7"),
    ("38 || 成人,孕妇 || 女 || 皮肤瘙痒,光敏感性皮疹,乏力 || 皮肤卟啉病 || 黄褐斑", "0"),
    ("59 || 成人 || 男 || 勃起功能障碍,潮热 || 绝经 || 闭经", "1,5"),
];

/// A request for a symptom narrative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymptomRequest {
    pub age: u32,
    pub gender: String,
    pub groups: Vec<String>,
    pub diagnosis: String,
}

impl SymptomRequest {
    /// Canonical input line: `age || gender || groups || XX || diagnosis`.
    pub fn canonical_input(&self) -> String {
        [
            self.age.to_string(),
            self.gender.clone(),
            self.groups.join(","),
            SYMPTOM_SLOT.to_string(),
            self.diagnosis.clone(),
        ]
        .join(SPLITTER)
    }

    /// Full prompt text sent to the oracle.
    pub fn prompt(&self) -> String {
        let mut prompt = String::new();
        prompt.push_str(SYMPTOM_INSTRUCTIONS);
        prompt.push_str("\n\n");
        for (input, output) in SYMPTOM_EXAMPLES {
            prompt.push_str("input: ");
            prompt.push_str(input);
            prompt.push_str("\noutput: ");
            prompt.push_str(output);
            prompt.push_str("\n\n");
        }
        prompt.push_str("input: ");
        prompt.push_str(&self.canonical_input());
        prompt.push_str("\noutput: ");
        prompt
    }
}

/// A request to audit a tentative record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRequest {
    pub age: u32,
    pub groups: Vec<String>,
    pub gender: String,
    pub symptoms: Vec<String>,
    pub diagnosis: String,
    pub antecedents: Vec<String>,
}

impl AuditRequest {
    /// Canonical input line: `age || groups || gender || symptoms || diagnosis || history`.
    pub fn canonical_input(&self) -> String {
        let history = if self.antecedents.is_empty() {
            NO_HISTORY.to_string()
        } else {
            self.antecedents.join(",")
        };
        [
            self.age.to_string(),
            self.groups.join(","),
            self.gender.clone(),
            self.symptoms.join(","),
            self.diagnosis.clone(),
            history,
        ]
        .join(SPLITTER)
    }

    /// Full prompt text sent to the oracle.
    pub fn prompt(&self) -> String {
        let mut prompt = String::new();
        prompt.push_str(AUDIT_INSTRUCTIONS);
        prompt.push_str("\n\n");
        for (input, code) in AUDIT_EXAMPLES {
            prompt.push_str("输入: ");
            prompt.push_str(input);
            prompt.push_str("\n输出: ");
            prompt.push_str(code);
            prompt.push_str("\n\n");
        }
        prompt.push_str("输入: ");
        prompt.push_str(&self.canonical_input());
        prompt.push('\n');
        prompt
    }
}
