//! Outbound delivery: Telegram Bot API messages and Twilio SMS.
//!
//! Web push is accepted but only logged; there is no VAPID signer in this
//! build.

use futures_util::future::{BoxFuture, FutureExt};
use remis_core::collab::{CollaboratorError, Notifier, Outbound};
use reqwest::Client;
use serde_json::json;
use tracing::{debug, info};

/// Credentials and recipients; any missing piece disables that channel.
#[derive(Debug, Clone, Default)]
pub struct NotifierConfig {
  pub telegram_bot_token: Option<String>,
  pub telegram_chat_id:   Option<String>,
  pub twilio_account_sid: Option<String>,
  pub twilio_auth_token:  Option<String>,
  pub twilio_from_sms:    Option<String>,
  pub dispatcher_phone:   Option<String>,
}

#[derive(Clone)]
pub struct HttpNotifier {
  client:       Client,
  config:       NotifierConfig,
  telegram_api: String,
  twilio_api:   String,
}

impl HttpNotifier {
  pub fn new(client: Client, config: NotifierConfig) -> Self {
    Self {
      client,
      config,
      telegram_api: "https://api.telegram.org".into(),
      twilio_api: "https://api.twilio.com".into(),
    }
  }

  fn telegram_url(&self, token: &str) -> String {
    format!("{}/bot{token}/sendMessage", self.telegram_api)
  }

  fn twilio_url(&self, account_sid: &str) -> String {
    format!("{}/2010-04-01/Accounts/{account_sid}/Messages.json", self.twilio_api)
  }

  async fn telegram(&self, text: &str) -> Result<(), CollaboratorError> {
    let (Some(token), Some(chat_id)) =
      (&self.config.telegram_bot_token, &self.config.telegram_chat_id)
    else {
      return Err(CollaboratorError::NotConfigured("telegram"));
    };
    self
      .client
      .post(self.telegram_url(token))
      .json(&json!({ "chat_id": chat_id, "text": text }))
      .send()
      .await
      .and_then(reqwest::Response::error_for_status)
      .map_err(|e| CollaboratorError::request("telegram", e))?;
    Ok(())
  }

  async fn sms(&self, to: &str, text: &str) -> Result<(), CollaboratorError> {
    let config = &self.config;
    let (Some(sid), Some(token), Some(from)) = (
      &config.twilio_account_sid,
      &config.twilio_auth_token,
      &config.twilio_from_sms,
    ) else {
      return Err(CollaboratorError::NotConfigured("twilio"));
    };
    // Twilio only takes E.164 numbers.
    if !to.starts_with('+') {
      debug!(to, "skipping SMS to a number without country code");
      return Ok(());
    }
    self
      .client
      .post(self.twilio_url(sid))
      .basic_auth(sid, Some(token))
      .form(&sms_form(from, to, text))
      .send()
      .await
      .and_then(reqwest::Response::error_for_status)
      .map_err(|e| CollaboratorError::request("twilio", e))?;
    Ok(())
  }
}

fn sms_form<'a>(from: &'a str, to: &'a str, body: &'a str) -> [(&'static str, &'a str); 3] {
  [("From", from), ("To", to), ("Body", body)]
}

impl Notifier for HttpNotifier {
  fn notify(&self, message: Outbound) -> BoxFuture<'_, Result<(), CollaboratorError>> {
    async move {
      match message {
        Outbound::Telegram { text } => self.telegram(&text).await,
        Outbound::Dispatcher { text } => {
          let phone = self
            .config
            .dispatcher_phone
            .as_deref()
            .ok_or(CollaboratorError::NotConfigured("dispatcher_phone"))?;
          self.sms(phone, &text).await
        }
        Outbound::Sms { to, text } => self.sms(&to, &text).await,
        Outbound::Push { subscriptions, payload } => {
          info!(
            subscriptions = subscriptions.len(),
            kind = payload["type"].as_str().unwrap_or_default(),
            "web push not delivered"
          );
          Ok(())
        }
      }
    }
    .boxed()
  }
}
