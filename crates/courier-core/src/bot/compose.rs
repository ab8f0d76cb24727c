//! In-progress email drafts.

use courier_mime::Attachment;

use crate::service::{MAX_ATTACHMENT_BYTES, OutgoingEmail};
use crate::setup::is_valid_email;

/// What the compose flow is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeStep {
    /// Recipient address(es).
    Recipient,
    /// Subject line.
    Subject,
    /// Message body.
    Body,
    /// Optional files, then the Send button.
    Attachments,
}

impl ComposeStep {
    /// Question asked while waiting for this step.
    #[must_use]
    pub const fn prompt(self) -> &'static str {
        match self {
            Self::Recipient => "Enter the recipient's email address:",
            Self::Subject => "Enter the subject:",
            Self::Body => "Enter the message:",
            Self::Attachments => "Attach files if you like, then press Send.",
        }
    }
}

/// Why a compose input was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComposeError {
    /// Recipient text is not a list of valid addresses.
    #[error("Invalid email address: {0}")]
    InvalidRecipient(String),

    /// The file would push the draft over the attachment limit.
    #[error("Attachments would exceed the 20 MB limit")]
    TooLarge,

    /// Files are only accepted once the body is written.
    #[error("Attachments can be added after the message text")]
    NotReadyForFiles,
}

/// A message being composed.
#[derive(Debug, Clone)]
pub struct ComposeDraft {
    step: ComposeStep,
    email: OutgoingEmail,
}

impl Default for ComposeDraft {
    fn default() -> Self {
        Self::new()
    }
}

impl ComposeDraft {
    /// Empty draft waiting for a recipient.
    #[must_use]
    pub fn new() -> Self {
        Self {
            step: ComposeStep::Recipient,
            email: OutgoingEmail::default(),
        }
    }

    /// Current step.
    #[must_use]
    pub const fn step(&self) -> ComposeStep {
        self.step
    }

    /// Recipient text as entered.
    #[must_use]
    pub fn recipient(&self) -> &str {
        &self.email.to
    }

    /// Number of attached files.
    #[must_use]
    pub fn attachment_count(&self) -> usize {
        self.email.attachments.len()
    }

    /// Running attachment total.
    #[must_use]
    pub fn attachment_bytes(&self) -> usize {
        self.email.attachment_bytes()
    }

    /// Accepts text for the current step and returns the next one.
    ///
    /// # Errors
    ///
    /// Returns [`ComposeError::InvalidRecipient`] for a bad address list.
    pub fn accept_text(&mut self, text: &str) -> Result<ComposeStep, ComposeError> {
        match self.step {
            ComposeStep::Recipient => {
                let to = text.trim();
                let valid = !to.is_empty()
                    && to
                        .split(',')
                        .map(str::trim)
                        .all(is_valid_email);
                if !valid {
                    return Err(ComposeError::InvalidRecipient(to.to_string()));
                }
                self.email.to = to.to_string();
                self.step = ComposeStep::Subject;
            }
            ComposeStep::Subject => {
                self.email.subject = text.trim().to_string();
                self.step = ComposeStep::Body;
            }
            ComposeStep::Body => {
                self.email.body = text.to_string();
                self.step = ComposeStep::Attachments;
            }
            ComposeStep::Attachments => {}
        }
        Ok(self.step)
    }

    /// Adds a file, keeping the total within the limit.
    ///
    /// # Errors
    ///
    /// Returns [`ComposeError::NotReadyForFiles`] before the body is
    /// written and [`ComposeError::TooLarge`] when the file does not fit.
    pub fn add_attachment(&mut self, attachment: Attachment) -> Result<usize, ComposeError> {
        if self.step != ComposeStep::Attachments {
            return Err(ComposeError::NotReadyForFiles);
        }
        if self.attachment_bytes() + attachment.len() > MAX_ATTACHMENT_BYTES {
            return Err(ComposeError::TooLarge);
        }
        self.email.attachments.push(attachment);
        Ok(self.email.attachments.len())
    }

    /// True once recipient, subject and body are present.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.step == ComposeStep::Attachments
    }

    /// Converts the draft into a sendable message.
    #[must_use]
    pub fn to_email(&self) -> OutgoingEmail {
        self.email.clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ready() -> ComposeDraft {
        let mut draft = ComposeDraft::new();
        draft.accept_text("b@example.com").unwrap();
        draft.accept_text("Hi").unwrap();
        draft.accept_text("body").unwrap();
        draft
    }

    #[test]
    fn walks_through_steps() {
        let mut draft = ComposeDraft::new();
        assert_eq!(draft.accept_text(" b@example.com ").unwrap(), ComposeStep::Subject);
        assert_eq!(draft.accept_text("Hi").unwrap(), ComposeStep::Body);
        assert!(!draft.is_ready());
        assert_eq!(draft.accept_text("line 1\nline 2").unwrap(), ComposeStep::Attachments);
        assert!(draft.is_ready());

        let email = draft.to_email();
        assert_eq!(email.to, "b@example.com");
        assert_eq!(email.subject, "Hi");
        assert_eq!(email.body, "line 1\nline 2");
    }

    #[test]
    fn rejects_bad_recipient() {
        let mut draft = ComposeDraft::new();
        assert!(matches!(
            draft.accept_text("nobody"),
            Err(ComposeError::InvalidRecipient(_))
        ));
        assert!(draft.accept_text("a@example.com, ").is_err());
        assert_eq!(draft.step(), ComposeStep::Recipient);
        assert!(draft.accept_text("a@example.com, c@example.com").is_ok());
    }

    #[test]
    fn files_only_after_body() {
        let mut draft = ComposeDraft::new();
        let file = Attachment::new("a.txt", vec![1]).unwrap();
        assert_eq!(draft.add_attachment(file.clone()), Err(ComposeError::NotReadyForFiles));

        let mut draft = ready();
        assert_eq!(draft.add_attachment(file), Ok(1));
    }

    #[test]
    fn running_total_is_capped() {
        let mut draft = ready();
        let half = MAX_ATTACHMENT_BYTES / 2;
        draft.add_attachment(Attachment::new("a", vec![0; half]).unwrap()).unwrap();
        draft.add_attachment(Attachment::new("b", vec![0; half]).unwrap()).unwrap();
        assert_eq!(draft.attachment_bytes(), MAX_ATTACHMENT_BYTES);
        assert_eq!(
            draft.add_attachment(Attachment::new("c", vec![0; 1]).unwrap()),
            Err(ComposeError::TooLarge)
        );
        assert_eq!(draft.attachment_count(), 2);
    }
}
