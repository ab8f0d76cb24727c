//! Routing of chat events to the core.

use chrono::Utc;
use courier_mime::{Attachment, ContentType};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

use super::compose::{ComposeDraft, ComposeStep};
use super::{Action, Button, ChatSink, Command, Document, Event, Incoming, Reply};
use crate::account::{ConfigStore, UserId};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::service::Mailer;
use crate::setup::{Setup, SetupOutcome};
use crate::stats::{Metric, Stats};

const HELP_TEXT: &str = "How to use this bot:\n\n\
    1. /configure - store your mailbox settings (SMTP/IMAP server, email, password)\n\
    2. /send - compose an email: recipient, subject, text, then optional files\n\
    3. /cancel - abandon what you are doing\n\n\
    Your email and password are stored encrypted.";

/// Operator settings for the bot.
#[derive(Debug, Clone, Default)]
pub struct BotSettings {
    /// Users allowed to run `/logs` and `/users`.
    pub admins: HashSet<UserId>,
    /// Log file sent by `/logs`.
    pub log_file: Option<PathBuf>,
}

/// Handles chat events for all users.
pub struct Bot {
    setup: Setup,
    mailer: Mailer,
    configs: ConfigStore,
    stats: Stats,
    settings: BotSettings,
    sink: Arc<dyn ChatSink>,
    drafts: Mutex<HashMap<UserId, ComposeDraft>>,
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Bot {
    /// Creates a bot over the core components.
    #[must_use]
    pub fn new(context: &Context, sink: Arc<dyn ChatSink>, settings: BotSettings) -> Self {
        Self {
            setup: context.setup.clone(),
            mailer: context.mailer.clone(),
            configs: context.configs.clone(),
            stats: context.stats.clone(),
            settings,
            sink,
            drafts: Mutex::new(HashMap::new()),
        }
    }

    /// Handles one event. Failures are logged and reported to the user.
    pub async fn handle(&self, incoming: Incoming) {
        let user = incoming.user;
        if let Err(err) = self.route(incoming).await {
            error!(%user, error = %err, "handler failed");
            if matches!(err, Error::Chat(_)) {
                return;
            }
            let reply = Reply::text(format!("❌ {}", err.user_message()));
            if let Err(send_err) = self.sink.respond(user, reply).await {
                warn!(%user, error = %send_err, "could not report failure");
            }
        }
    }

    async fn route(&self, incoming: Incoming) -> Result<()> {
        let Incoming {
            user,
            first_name,
            event,
        } = incoming;
        debug!(%user, kind = event.kind(), "event");

        match event {
            Event::Command(Command::Start) => self.start(user, first_name.as_deref()).await,
            Event::Command(Command::Help) | Event::Button(Action::Help) => {
                self.say(user, Reply::text(HELP_TEXT)).await
            }
            Event::Command(Command::Configure) | Event::Button(Action::Configure) => {
                self.begin_setup(user).await
            }
            Event::Command(Command::Send) | Event::Button(Action::SendEmail) => {
                self.begin_compose(user).await
            }
            Event::Command(Command::Cancel) | Event::Button(Action::Cancel) => {
                self.cancel(user).await
            }
            Event::Command(Command::Logs) => self.logs(user).await,
            Event::Command(Command::Users) => self.users(user).await,
            Event::Button(Action::CheckInbox) => {
                self.say(
                    user,
                    Reply::text(
                        "📭 Reading mail is not available yet. \
                         Replies arrive in your mailbox as usual.",
                    ),
                )
                .await
            }
            Event::Button(Action::ComposeSend) => self.send_draft(user).await,
            Event::Text(text) => self.text(user, &text).await,
            Event::Document(document) => self.document(user, document).await,
        }
    }

    async fn say(&self, user: UserId, reply: Reply) -> Result<()> {
        Ok(self.sink.respond(user, reply).await?)
    }

    fn drafts(&self) -> MutexGuard<'_, HashMap<UserId, ComposeDraft>> {
        self.drafts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn start(&self, user: UserId, first_name: Option<&str>) -> Result<()> {
        self.stats.increment(Metric::UsersActive).await;
        self.stats
            .increment_daily(Metric::UsersActive, Utc::now().date_naive())
            .await;

        let greeting = first_name.map_or_else(|| "Hi!".to_string(), |name| format!("Hi {name}!"));
        let reply = Reply::text(format!(
            "{greeting} Welcome to Courier\n\n\
             Features:\n\
             • Send emails with attachments from chat\n\
             • Encrypted credential storage\n\
             • Works with any SMTP provider"
        ))
        .with_row(vec![
            Button::new("Configure Email", Action::Configure),
            Button::new("Send Email", Action::SendEmail),
        ])
        .with_row(vec![
            Button::new("Check Inbox", Action::CheckInbox),
            Button::new("Help", Action::Help),
        ]);
        self.say(user, reply).await
    }

    async fn begin_setup(&self, user: UserId) -> Result<()> {
        self.drafts().remove(&user);
        let step = self.setup.begin(user).await?;
        self.say(user, cancellable(step.prompt())).await
    }

    async fn begin_compose(&self, user: UserId) -> Result<()> {
        self.setup.cancel(user).await?;
        let sendable = self
            .configs
            .get(user)
            .await?
            .is_some_and(|config| config.is_sendable());
        if !sendable {
            return self
                .say(
                    user,
                    Reply::text("❌ Email is not configured yet.")
                        .with_row(vec![Button::new("Configure Email", Action::Configure)]),
                )
                .await;
        }

        self.drafts().insert(user, ComposeDraft::new());
        self.say(user, cancellable(ComposeStep::Recipient.prompt())).await
    }

    async fn cancel(&self, user: UserId) -> Result<()> {
        self.drafts().remove(&user);
        self.setup.cancel(user).await?;
        self.say(user, Reply::text("Cancelled.")).await
    }

    async fn text(&self, user: UserId, text: &str) -> Result<()> {
        let compose_result = {
            let mut drafts = self.drafts();
            drafts.get_mut(&user).map(|draft| draft.accept_text(text))
        };
        if let Some(result) = compose_result {
            let reply = match result {
                Ok(ComposeStep::Attachments) => send_prompt(ComposeStep::Attachments.prompt()),
                Ok(next) => cancellable(next.prompt()),
                Err(err) => cancellable(format!("❌ {err}. Try again:")),
            };
            return self.say(user, reply).await;
        }

        let reply = match self.setup.handle_input(user, text).await? {
            SetupOutcome::Advanced(next) => cancellable(next.prompt()),
            SetupOutcome::Rejected(reason) => {
                cancellable(format!("❌ {}. Try again:", reason.message()))
            }
            SetupOutcome::Committed => Reply::text("✅ Email configured successfully!")
                .with_row(vec![Button::new("Send Email", Action::SendEmail)]),
            SetupOutcome::NotInSetup => Reply::text("Use /start to see what I can do."),
        };
        self.say(user, reply).await
    }

    async fn document(&self, user: UserId, document: Document) -> Result<()> {
        let attachment = match to_attachment(document) {
            Ok(attachment) => attachment,
            Err(err) => return self.say(user, Reply::text(format!("❌ {err}"))).await,
        };
        let name = attachment.filename().to_string();
        let added = {
            let mut drafts = self.drafts();
            drafts
                .get_mut(&user)
                .map(|draft| draft.add_attachment(attachment))
        };

        let reply = match added {
            None => Reply::text("Files can be attached while composing. Use /send first."),
            Some(Ok(count)) => {
                debug!(%user, count, "attachment added");
                send_prompt(format!(
                    "📎 Attached {name} ({count} file(s)). Send more or press Send."
                ))
            }
            Some(Err(err)) => cancellable(format!("❌ {err}.")),
        };
        self.say(user, reply).await
    }

    async fn send_draft(&self, user: UserId) -> Result<()> {
        let draft = self.drafts().remove(&user);
        let Some(draft) = draft.filter(ComposeDraft::is_ready) else {
            return self
                .say(user, Reply::text("Nothing to send. Use /send to compose an email."))
                .await;
        };

        match self.mailer.send_email(user, draft.to_email()).await {
            Ok(()) => {
                self.say(user, Reply::text(format!("✅ Email sent to {}", draft.recipient())))
                    .await
            }
            Err(err) => {
                // Keep the draft so the user can press Send again.
                self.drafts().insert(user, draft);
                Err(err.into())
            }
        }
    }

    fn is_admin(&self, user: UserId) -> bool {
        self.settings.admins.contains(&user)
    }

    async fn logs(&self, user: UserId) -> Result<()> {
        if !self.is_admin(user) {
            return self.say(user, Reply::text("⛔ Unauthorized")).await;
        }
        let Some(path) = &self.settings.log_file else {
            return self.say(user, Reply::text("No log file is configured.")).await;
        };

        let data = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map_or_else(|| "courier.log".to_string(), |n| n.to_string_lossy().into_owned());
        self.sink.respond_with_file(user, &filename, data).await?;
        info!(admin = %user, "admin downloaded logs");
        Ok(())
    }

    async fn users(&self, user: UserId) -> Result<()> {
        if !self.is_admin(user) {
            return self.say(user, Reply::text("⛔ Unauthorized")).await;
        }
        let total = self.configs.list_configured_user_ids().await?.len();
        let sent = self.stats.read(Metric::EmailsSent).await?;
        let today = self
            .stats
            .read_daily(Metric::UsersActive, Utc::now().date_naive())
            .await?;
        let starts = self.stats.read(Metric::UsersActive).await?;
        let setups = self.stats.read(Metric::SetupsCompleted).await?;

        self.say(
            user,
            Reply::text(format!(
                "📊 Bot Statistics:\n\n\
                 • Total Users: {total}\n\
                 • Emails Sent: {sent}\n\
                 • Active Today: {today}\n\
                 • Starts (all time): {starts}\n\
                 • Setups Completed: {setups}"
            )),
        )
        .await
    }
}

fn cancellable(text: impl Into<String>) -> Reply {
    Reply::text(text).with_row(vec![Button::new("Cancel", Action::Cancel)])
}

fn send_prompt(text: impl Into<String>) -> Reply {
    Reply::text(text).with_row(vec![
        Button::new("Send", Action::ComposeSend),
        Button::new("Cancel", Action::Cancel),
    ])
}

fn to_attachment(document: Document) -> courier_mime::Result<Attachment> {
    let content_type = document
        .mime_type
        .as_deref()
        .and_then(|mime| ContentType::parse(mime).ok())
        .unwrap_or_else(ContentType::octet_stream);
    let filename = document
        .filename
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "attachment".to_string());
    Ok(Attachment::new(filename, document.data)?.with_content_type(content_type))
}
