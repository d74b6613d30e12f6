//! Prompt Building
//!
//! Constructs the fixed system prompt for the festival assistant and the
//! helper turns used when a long conversation is compressed.

use cognizance_config::constants::contact;
use cognizance_core::ConversationTurn;

/// Instruction appended to the older turns when asking for a summary
pub const SUMMARY_INSTRUCTION: &str = "Please summarize the preceding conversation into 2-3 short sentences focusing on user goals, important facts, and any unresolved issues. Keep the summary concise.";

const SUMMARY_PREFIX: &str = "Summary of the earlier conversation: ";

/// Assistant turn that stands in for the summarized part of a history
pub fn summary_turn(summary: &str) -> ConversationTurn {
    ConversationTurn::assistant(format!("{}{}", SUMMARY_PREFIX, summary.trim()))
}

/// Builder for the assistant's system prompt
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    support_email: String,
    context: Option<String>,
    date_note: Option<String>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self {
            support_email: contact::SUPPORT_EMAIL.to_string(),
            context: None,
            date_note: Some(
                "Current Date: February 2026 (Festival dates: 13th-15th March 2026)".to_string(),
            ),
        }
    }

    /// Address users are sent to when an issue cannot be fixed in chat
    pub fn with_support_email(mut self, email: impl Into<String>) -> Self {
        self.support_email = email.into();
        self
    }

    /// Festival knowledge the assistant answers from
    pub fn with_context(mut self, context: &str) -> Self {
        if !context.trim().is_empty() {
            self.context = Some(context.trim().to_string());
        }
        self
    }

    pub fn with_date_note(mut self, note: Option<String>) -> Self {
        self.date_note = note;
        self
    }

    pub fn build(self) -> String {
        let mut prompt = String::with_capacity(
            4096 + self.context.as_ref().map_or(0, String::len),
        );

        prompt.push_str(
            "You are an intelligent AI assistant for Cognizance 2026, the annual technical festival of IIT Roorkee.\n\n",
        );

        prompt.push_str(
            "Your role is to:\n\
             1. Help users learn about the festival, its events, workshops and activities\n\
             2. Answer questions about registration, dates, prizes and participation\n\
             3. Share past highlights, workshops and notable moments of the festival\n\
             4. Point users to the right resources and contacts\n\
             5. Help users raise queries or issues when they need support\n\n",
        );

        prompt.push_str(
            "Guidelines:\n\
             - Be friendly, helpful and enthusiastic about Cognizance\n\
             - Answer accurately from the festival information below\n\
             - If you do not know something, say so honestly and suggest contacting the team\n\
             - Encourage participation and highlight what makes the festival exciting\n\n",
        );

        prompt.push_str(
            "RESPONSE STYLE:\n\
             - Keep answers SHORT: 2 to 3 sentences for simple questions, 4 to 5 for detailed ones, never more than a small paragraph.\n\
             - Sound conversational and simple, like chatting with a friend.\n\
             - Do NOT use markdown such as bold, italics, headers, bullet lists or code blocks.\n\
             - Do NOT use decorative punctuation like dashes, asterisks or special characters.\n\
             - Write plain, natural sentences. No walls of text.\n\
             - Use emojis very sparingly, only when they genuinely add warmth.\n\
             - When asked about several things, give a brief answer for each.\n\
             - Do NOT over-explain or repeat yourself.\n\n",
        );

        prompt.push_str(&format!(
            "ISSUE / TROUBLESHOOTING FLOW:\n\
             - When a user reports a problem, suggest one practical fix at a time.\n\
             - After each suggestion, ask the user to try it and confirm whether it worked before offering the next one.\n\
             - Offer up to 3 to 4 fixes this way, each short and easy to follow.\n\
             - If the issue is still unresolved or the user asks to escalate, share the team contact {} and offer to summarize the attempted fixes for them.\n\n",
            self.support_email
        ));

        if let Some(context) = &self.context {
            prompt.push_str("Festival Information:\n");
            prompt.push_str(context);
            prompt.push_str("\n\n");
        }

        if let Some(note) = &self.date_note {
            prompt.push_str(note);
            prompt.push_str("\n\n");
        }

        prompt.push_str(
            "Remember: You represent Cognizance and IIT Roorkee. Be professional, accurate, and helpful!",
        );

        prompt
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}
