use crate::config::DrafterKind;
use crate::models::money::format_amount;
use crate::models::AuditResult;
use bigdecimal::{BigDecimal, Zero};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum DraftError {
    #[error("invalid letter tone '{0}', expected formal, friendly or assertive")]
    InvalidTone(String),
    #[error("letter provider failed: {0}")]
    Provider(String),
}

/// 信函语气
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LetterTone {
    #[default]
    #[serde(alias = "FORMAL")]
    Formal,
    #[serde(alias = "FRIENDLY")]
    Friendly,
    #[serde(alias = "ASSERTIVE")]
    Assertive,
}

impl FromStr for LetterTone {
    type Err = DraftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "formal" => Ok(LetterTone::Formal),
            "friendly" => Ok(LetterTone::Friendly),
            "assertive" => Ok(LetterTone::Assertive),
            _ => Err(DraftError::InvalidTone(s.to_string())),
        }
    }
}

/// 患者信息，缺省字段保留占位符
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientInfo {
    pub patient_name: Option<String>,
    pub account_number: Option<String>,
    pub date_of_service: Option<String>,
    pub provider_name: Option<String>,
    pub patient_address: Option<String>,
    pub patient_phone: Option<String>,
    pub patient_email: Option<String>,
}

impl PatientInfo {
    fn replacements(&self) -> [(&'static str, Option<&str>); 7] {
        [
            ("[PATIENT NAME]", self.patient_name.as_deref()),
            ("[ACCOUNT NUMBER]", self.account_number.as_deref()),
            ("[DATE OF SERVICE]", self.date_of_service.as_deref()),
            ("[PROVIDER NAME]", self.provider_name.as_deref()),
            ("[PATIENT ADDRESS]", self.patient_address.as_deref()),
            ("[PATIENT PHONE]", self.patient_phone.as_deref()),
            ("[PATIENT EMAIL]", self.patient_email.as_deref()),
        ]
    }

    /// 用已知信息替换占位符
    pub fn fill(&self, letter: &str) -> String {
        self.replacements()
            .iter()
            .fold(letter.to_string(), |text, (placeholder, value)| match value {
                Some(v) if !v.trim().is_empty() => text.replace(placeholder, v),
                _ => text,
            })
    }
}

/// 起草请求：日期由调用方提供，保证输出可复现
#[derive(Debug, Clone)]
pub struct LetterRequest<'a> {
    pub result: &'a AuditResult,
    pub tone: LetterTone,
    pub patient: Option<&'a PatientInfo>,
    pub date: NaiveDate,
}

/// 申诉信起草能力
pub trait LetterDrafter: Send + Sync {
    fn name(&self) -> &'static str;

    fn draft(&self, request: &LetterRequest<'_>) -> Result<String, DraftError>;
}

/// 启动时按配置选定实现
pub fn build_drafter(kind: DrafterKind) -> Box<dyn LetterDrafter> {
    match kind {
        DrafterKind::Template => Box::new(TemplateLetterDrafter),
    }
}

struct ToneText {
    salutation: &'static str,
    opening: &'static str,
    urgency: &'static str,
    closing: &'static str,
}

fn tone_text(tone: LetterTone) -> ToneText {
    match tone {
        LetterTone::Formal => ToneText {
            salutation: "Dear Sir/Madam,",
            opening: "I am writing to formally dispute certain charges on the medical bill referenced above.",
            urgency: "I respectfully request a response within 30 days of receipt of this letter.",
            closing: "Sincerely,",
        },
        LetterTone::Friendly => ToneText {
            salutation: "Hello,",
            opening: "I hope this letter finds you well. I am reaching out about some concerns with my recent medical bill.",
            urgency: "I would appreciate hearing back from you within the next 30 days so we can resolve this together.",
            closing: "Thank you for your help,",
        },
        LetterTone::Assertive => ToneText {
            salutation: "To Whom It May Concern,",
            opening: "I am writing to dispute the following charges on my medical bill, which I believe to be incorrect.",
            urgency: "I expect a written response within 30 days. If this is not resolved satisfactorily, I will escalate the matter to the appropriate regulatory authorities.",
            closing: "Regards,",
        },
    }
}

/// 模板起草：不依赖外部服务
pub struct TemplateLetterDrafter;

impl TemplateLetterDrafter {
    fn header(date: NaiveDate) -> String {
        format!(
            "{}\n\n[PROVIDER NAME]\nBilling Department\n[PROVIDER ADDRESS]\n\n",
            date.format("%B %d, %Y")
        )
    }

    fn acknowledgement(request: &LetterRequest<'_>, text: &ToneText) -> String {
        let mut letter = Self::header(request.date);
        letter.push_str("Re: Account Number [ACCOUNT NUMBER]\nPatient: [PATIENT NAME]\nDate of Service: [DATE OF SERVICE]\n\n");
        let _ = write!(
            letter,
            "{}\n\nI am writing regarding the medical bill referenced above. After careful review of the charges, \
             I have completed an audit of this statement.\n\n\
             The bill appears to be accurate, with an audit score of {}/100. No discrepancies were identified.\n\n\
             Thank you for your accurate billing practices.\n\n{}\n\n[PATIENT NAME]\n",
            text.salutation, request.result.score, text.closing
        );
        letter
    }

    fn dispute(request: &LetterRequest<'_>, text: &ToneText) -> String {
        let result = request.result;
        let mut letter = Self::header(request.date);
        letter.push_str(
            "Re: Billing Dispute\nAccount Number: [ACCOUNT NUMBER]\nPatient: [PATIENT NAME]\nDate of Service: [DATE OF SERVICE]\n\n",
        );
        let _ = write!(
            letter,
            "{}\n\n{}\n\nAfter auditing my bill (score {}/100), I have identified {} issue(s) that require your attention. \
             The potential overcharges total {}.\n\nThe following issues were identified:\n\n",
            text.salutation,
            text.opening,
            result.score,
            result.issues.len(),
            format_amount(result.region, &result.potential_savings)
        );

        for (n, issue) in result.issues.iter().enumerate() {
            let _ = write!(letter, "{}. [{}] {}", n + 1, issue.severity, issue.description);
            if let Some(amount) = issue.amount_impact.as_ref().filter(|a| **a > BigDecimal::zero()) {
                let _ = write!(letter, " (Disputed amount: {})", format_amount(result.region, amount));
            }
            letter.push('\n');
        }

        let _ = write!(
            letter,
            "\nI am requesting the following actions:\n\n\
             1. A detailed, itemized breakdown of all charges\n\
             2. Correction of the identified errors\n\
             3. An adjusted bill reflecting the accurate amounts\n\
             4. Written confirmation of any adjustments made\n\n\
             {}\n\nPlease send your response to:\n\n\
             [PATIENT NAME]\n[PATIENT ADDRESS]\n[PATIENT PHONE]\n[PATIENT EMAIL]\n\n\
             {}\n\n[PATIENT NAME]\n\nEnclosures:\n- Copy of original bill\n- Audit report\n",
            text.urgency, text.closing
        );
        letter
    }
}

impl LetterDrafter for TemplateLetterDrafter {
    fn name(&self) -> &'static str {
        "template"
    }

    fn draft(&self, request: &LetterRequest<'_>) -> Result<String, DraftError> {
        let text = tone_text(request.tone);
        let letter = if request.result.issues.is_empty() {
            tracing::info!("无问题，生成确认函 ({:?})", request.tone);
            Self::acknowledgement(request, &text)
        } else {
            tracing::info!("生成申诉信: {} 个问题 ({:?})", request.result.issues.len(), request.tone);
            Self::dispute(request, &text)
        };

        Ok(match request.patient {
            Some(patient) => patient.fill(&letter),
            None => letter,
        })
    }
}
