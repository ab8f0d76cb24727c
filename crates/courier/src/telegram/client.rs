//! HTTP client for the Telegram Bot API.

use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, trace};

use super::types::{
    AnswerCallbackQueryRequest, File, GetFileRequest, GetUpdatesRequest, InlineKeyboardMarkup,
    Message, SendMessageRequest, TelegramResponse, Update,
};

/// Headroom on top of the long-poll timeout before the request is abandoned.
const POLL_SLACK: Duration = Duration::from_secs(10);

/// Timeout for every call other than `getUpdates`.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Bot API call failures. The bot token never appears in these.
#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    /// The request could not be sent or its body could not be read.
    #[error("HTTP request failed: {0}")]
    Http(#[source] reqwest::Error),

    /// Telegram answered `ok: false`.
    #[error("Bot API error: {0}")]
    Api(String),
}

impl From<reqwest::Error> for TelegramError {
    fn from(err: reqwest::Error) -> Self {
        // reqwest puts the request URL, and with it the token, in its messages.
        Self::Http(err.without_url())
    }
}

/// Typed wrapper over the Bot API endpoints the bot uses.
pub struct TelegramClient {
    http: Client,
    /// `{api}/bot{token}`.
    base_url: String,
    /// `{api}/file/bot{token}`.
    file_url: String,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient").finish_non_exhaustive()
    }
}

impl TelegramClient {
    /// Creates a client for `token` against `api_url` (no trailing slash).
    #[must_use]
    pub fn new(api_url: &str, token: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: format!("{api_url}/bot{token}"),
            file_url: format!("{api_url}/file/bot{token}"),
        }
    }

    async fn call<Req, Resp>(
        &self,
        method: &str,
        request: &Req,
        timeout: Duration,
    ) -> Result<Resp, TelegramError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        trace!(method, "calling Bot API");
        let body: TelegramResponse<Resp> = self
            .http
            .post(format!("{}/{method}", self.base_url))
            .timeout(timeout)
            .json(request)
            .send()
            .await?
            .json()
            .await?;
        unwrap_response(body)
    }

    /// Long-polls for updates starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure or an API error.
    pub async fn get_updates(&self, offset: i64, timeout: Duration) -> Result<Vec<Update>, TelegramError> {
        let request = GetUpdatesRequest {
            offset,
            timeout: timeout.as_secs(),
            allowed_updates: vec!["message", "callback_query"],
        };
        let updates: Vec<Update> = self.call("getUpdates", &request, timeout + POLL_SLACK).await?;
        if !updates.is_empty() {
            debug!(count = updates.len(), "received updates");
        }
        Ok(updates)
    }

    /// Sends a text message, optionally with an inline keyboard.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure or an API error.
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<InlineKeyboardMarkup>,
    ) -> Result<Message, TelegramError> {
        let request = SendMessageRequest {
            chat_id,
            text: text.to_owned(),
            reply_markup,
        };
        self.call("sendMessage", &request, REQUEST_TIMEOUT).await
    }

    /// Stops the client-side spinner on a pressed button.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure or an API error.
    pub async fn answer_callback_query(&self, callback_query_id: &str) -> Result<(), TelegramError> {
        let request = AnswerCallbackQueryRequest {
            callback_query_id: callback_query_id.to_owned(),
        };
        let _: bool = self.call("answerCallbackQuery", &request, REQUEST_TIMEOUT).await?;
        Ok(())
    }

    /// Resolves a file id to a downloadable path.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure or an API error.
    pub async fn get_file(&self, file_id: &str) -> Result<File, TelegramError> {
        let request = GetFileRequest {
            file_id: file_id.to_owned(),
        };
        self.call("getFile", &request, REQUEST_TIMEOUT).await
    }

    /// Downloads a file previously resolved with [`Self::get_file`].
    ///
    /// # Errors
    ///
    /// Returns an error on network failure or a non-success status.
    pub async fn download_file(&self, file_path: &str) -> Result<Vec<u8>, TelegramError> {
        let bytes = self
            .http
            .get(format!("{}/{file_path}", self.file_url))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }

    /// Uploads `data` as a document.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure or an API error.
    pub async fn send_document(
        &self,
        chat_id: i64,
        filename: &str,
        data: Vec<u8>,
    ) -> Result<Message, TelegramError> {
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("document", Part::bytes(data).file_name(filename.to_owned()));
        let body: TelegramResponse<Message> = self
            .http
            .post(format!("{}/sendDocument", self.base_url))
            .timeout(REQUEST_TIMEOUT)
            .multipart(form)
            .send()
            .await?
            .json()
            .await?;
        unwrap_response(body)
    }
}

fn unwrap_response<T>(body: TelegramResponse<T>) -> Result<T, TelegramError> {
    if !body.ok {
        return Err(TelegramError::Api(
            body.description.unwrap_or_else(|| "unknown error".into()),
        ));
    }
    body.result
        .ok_or_else(|| TelegramError::Api("missing result in response".into()))
}
