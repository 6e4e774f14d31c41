//! LLM-backed outreach content: company descriptions, cold emails and
//! follow-up replies.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::AgencyConfig;
use crate::content::homepage::HomepageScraper;
use crate::content::template::{fill_placeholders, placeholder_values};
use crate::error::ContentError;
use crate::leads::{Conversation, Lead, LeadColumn, LeadUpdate};
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider, extract_json_object};
use crate::store::LeadStore;

const COLD_EMAIL_PROMPT: &str = r#"You are an expert in writing friendly, casual, and to-the-point cold emails. Your task is to generate a short, casual, personalized cold email using ONLY the following variables - DO NOT CREATE OR INSERT ANY OTHER VARIABLES OR PLACEHOLDERS:

Available Variables (use exactly as shown):
{recipient_name}
{role}
{company}
{agency_name}
{agency_info}
{sender_name}
{sender_position}
{agency_website}

Requirements:
1. Subject line must contain {company} and {role}
2. Email signature must include:
   - {sender_name}
   - {sender_position}
   - {agency_name}
   - {agency_website}

IMPORTANT:
- Do NOT invent, create, or use any placeholders not listed above
- Use variables exactly as shown - do NOT modify their format
- Do NOT add dynamic content like dates, times, or custom fields

Writing style: conversational, casual, engaging, simple to read, simple linear active voice sentences, informational and insightful.

Use the following formulas to write effective cold emails:

1. AIDA: Start with attention-grabbing subject/opening. Build interest with pain points. Create desire with benefits/social proof. End with specific CTA.
2. BBB: Brief, blunt, basic. Short, direct, simple language.
3. PAS: Problem, Agitate, Solve
4. QVC: Question, Value prop, Call-to-action
5. PPP: Praise, Picture benefits, Push to action
6. SCH: Star (intro), Chain (facts), Hook (CTA)
7. SSS: Star, Story, Solution
8. RDM: Fact-packed, Telegraphic, Specific, Few adjectives, Arouse curiosity

Respond with JSON containing subject and email content only:
{
  "subject": "<subject line>",
  "email": "<email content>"
}"#;

/// A generated email ready for review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailDraft {
    pub subject: String,
    pub email: String,
}

pub struct ContentGenerator {
    llm: Arc<dyn LlmProvider>,
    scraper: HomepageScraper,
    agency: AgencyConfig,
}

impl ContentGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>, agency: AgencyConfig) -> Self {
        Self {
            llm,
            scraper: HomepageScraper::new(),
            agency,
        }
    }

    pub fn agency(&self) -> &AgencyConfig {
        &self.agency
    }

    /// Summarise what the company at `domain` does, from its homepage.
    pub async fn describe_company(&self, domain: &str) -> Result<String, ContentError> {
        let text = self.scraper.company_text(domain).await?;
        let prompt = format!(
            "Here is some text extracted from the homepage of {domain}:\n\n{text}\n\n\
             Provide a brief and professional summary of what this company does."
        );
        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)])
            .with_max_tokens(150)
            .with_temperature(0.5);
        let response = self.llm.complete(request).await?;
        Ok(response.content.trim().to_string())
    }

    /// The lead's stored company background, generating and persisting it
    /// first if it is empty.
    pub async fn company_description_for(
        &self,
        store: &dyn LeadStore,
        lead: &Lead,
    ) -> Result<String, ContentError> {
        if !lead.company_background.trim().is_empty() {
            return Ok(lead.company_background.clone());
        }
        if lead.company_domain.trim().is_empty() {
            return Err(ContentError::MissingDomain(lead.email.clone()));
        }

        let description = self.describe_company(&lead.company_domain).await?;
        store
            .update_lead(
                &lead.email,
                &LeadUpdate::new().set(LeadColumn::CompanyBackground, description.clone()),
            )
            .await?;
        info!(lead = %lead.email, domain = %lead.company_domain, "Company description stored");
        Ok(description)
    }

    /// First-touch cold email with every placeholder filled in.
    pub async fn draft_cold_email(
        &self,
        lead: &Lead,
        company_description: &str,
    ) -> Result<EmailDraft, ContentError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(COLD_EMAIL_PROMPT),
            ChatMessage::user(format!(
                "Generate a cold email for {} at {}",
                lead.first_name(),
                lead.company_name
            )),
        ])
        .with_temperature(0.3);

        let response = self.llm.complete(request).await?;
        let draft = parse_draft(&response.content)?;

        let values = placeholder_values(lead, &self.agency, company_description);
        Ok(EmailDraft {
            subject: fill_placeholders(&draft.subject, &values),
            email: fill_placeholders(&draft.email, &values),
        })
    }

    /// A rapport-building reply to the lead's conversation so far.
    pub async fn draft_follow_up(&self, lead: &Lead) -> Result<String, ContentError> {
        let history = Conversation::from_stored(&lead.conversation_history)
            .map(|c| {
                c.chronological()
                    .into_iter()
                    .map(|(ts, entry)| format!("[{ts}] {}: {}", entry.sender, entry.message))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_else(|_| lead.conversation_history.clone());
        let lead_info = format!(
            "name: {}, role: {}, company: {}, industry: {}",
            lead.name, lead.role, lead.company_name, lead.industry
        );

        let prompt = format!(
            "Generate a response email based on the following conversation and lead info:\n\n\
             {history}\n\nand Lead INFO: {lead_info}\n\
             The response should be polite, engaging, and should focus on building rapport. \
             Do not reference agency info or services."
        );
        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)])
            .with_max_tokens(150)
            .with_temperature(0.7);
        let response = self.llm.complete(request).await?;
        Ok(response.content.trim().to_string())
    }
}

/// Parse `{subject, email}` from model output, tolerating code fences.
pub fn parse_draft(raw: &str) -> Result<EmailDraft, ContentError> {
    let json = extract_json_object(raw)
        .ok_or_else(|| ContentError::Draft("no JSON object in output".into()))?;
    serde_json::from_str(json).map_err(|e| ContentError::Draft(e.to_string()))
}
