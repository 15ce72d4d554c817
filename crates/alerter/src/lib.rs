use crate::error::AlerterError;
use configuration::TelegramConfig;
use core_types::ErrorKind;
use events::{LogLevel, SchedulerEvent};
use reqwest::Client;
use serde::Serialize;
use tokio::sync::broadcast;
pub mod error;

/// The JSON payload for the Telegram `sendMessage` endpoint.
#[derive(Debug, Serialize)]
struct SendMessagePayload<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str, // To allow for formatting like bold, italics etc.
}

/// A client for sending messages to the Telegram Bot API.
pub struct TelegramAlerter {
    client: Client,
    token: String,
    chat_id: String,
}

impl TelegramAlerter {
    /// Creates a new `TelegramAlerter`.
    ///
    /// Returns `None` if the token or chat_id is missing from the configuration,
    /// allowing the system to gracefully disable alerting.
    pub fn new(config: &TelegramConfig) -> Option<Self> {
        if config.token.is_empty() || config.chat_id.is_empty() {
            tracing::warn!("Telegram alerter is not configured (missing token or chat_id).");
            return None;
        }
        Some(Self {
            client: Client::new(),
            token: config.token.clone(),
            chat_id: config.chat_id.clone(),
        })
    }

    /// Sends a text message to the configured Telegram chat.
    pub async fn send_message(&self, message: &str) -> Result<(), AlerterError> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.token);

        let payload = SendMessagePayload {
            chat_id: &self.chat_id,
            text: message,
            parse_mode: "MarkdownV2",
        };

        let response = self.client.post(&url).json(&payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(AlerterError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

/// A long-running service that listens to the scheduler's event channel and
/// sends Telegram alerts for failures, open breakers and periodic reports.
pub async fn run_alerter_service(
    alerter: TelegramAlerter,
    mut event_rx: broadcast::Receiver<SchedulerEvent>,
) {
    tracing::info!("Alerter service started. Listening for scheduler events.");

    loop {
        match event_rx.recv().await {
            Ok(event) => {
                if let Some(msg) = format_alert(&event) {
                    if let Err(e) = alerter.send_message(&msg).await {
                        tracing::error!(error = ?e, "Failed to send Telegram alert.");
                    }
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("Alerter service lagged, skipped {} events.", n);
            }
            Err(broadcast::error::RecvError::Closed) => {
                tracing::info!("Event channel closed. Alerter service shutting down.");
                break;
            }
        }
    }
}

/// Renders the MarkdownV2 alert for an event, or `None` when the event is
/// not worth interrupting anyone for.
pub fn format_alert(event: &SchedulerEvent) -> Option<String> {
    match event {
        SchedulerEvent::Started => Some("✅ *Rebalancer started*".to_string()),
        SchedulerEvent::Stopped => Some("🛑 *Rebalancer stopped*".to_string()),
        SchedulerEvent::RebalanceFailed(record) => {
            let kind = record
                .result
                .error
                .map(|k| k.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let mut msg = format!(
                "❌ *Rebalance failed* for `{}`\nUrgency: {}, max deviation: {}\nError: {}",
                escape_markdown(record.portfolio_id.as_str()),
                record.urgency,
                escape_markdown(&record.max_deviation.to_string()),
                escape_markdown(&kind),
            );
            if let Some(detail) = &record.result.message {
                msg.push_str(&format!("\n_{}_", escape_markdown(detail)));
            }
            Some(msg)
        }
        SchedulerEvent::SnapshotFailed { portfolio_id, kind, message } => {
            let title = if *kind == ErrorKind::CircuitOpen {
                "🔌 *Circuit open*"
            } else {
                "⚠️ *Snapshot failed*"
            };
            Some(format!(
                "{} for `{}`\n{}",
                title,
                escape_markdown(portfolio_id.as_str()),
                escape_markdown(message)
            ))
        }
        SchedulerEvent::Report(report) => Some(format!(
            "📊 {}",
            escape_markdown(&report.to_string())
        )),
        SchedulerEvent::Log(log) => match log.level {
            LogLevel::Error => Some(format!("*🚨 ERROR*: {}", escape_markdown(&log.message))),
            LogLevel::Warn => Some(format!("*⚠️ WARN*: {}", escape_markdown(&log.message))),
            LogLevel::Info => None,
        },
        // Successes and gate refusals are routine.
        SchedulerEvent::RebalanceCompleted(_) | SchedulerEvent::GateSkipped(_) => None,
    }
}

/// A helper function to escape characters that have special meaning in Telegram's MarkdownV2.
fn escape_markdown(text: &str) -> String {
    let special_chars = r"\_*[]()~`>#+-=|{}.!";
    special_chars
        .chars()
        .fold(text.to_string(), |s, c| s.replace(c, &format!("\\{}", c)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_types::{EstimatedImpact, ExecutionResult, RebalanceOpportunity, RebalanceRecord, Urgency};
    use events::GateSkip;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn failed_record() -> RebalanceRecord {
        let opportunity = RebalanceOpportunity {
            portfolio_id: "fund-1".into(),
            deviations: BTreeMap::new(),
            max_deviation: dec!(0.15),
            urgency: Urgency::High,
            estimated_impact: EstimatedImpact::default(),
        };
        RebalanceRecord::new(
            Utc::now(),
            &opportunity,
            ExecutionResult::failed(42, ErrorKind::Rejected, "execution reverted (code 3)"),
        )
    }

    #[test]
    fn escapes_markdown_v2_specials() {
        assert_eq!(escape_markdown("a_b.c!"), r"a\_b\.c\!");
        assert_eq!(escape_markdown(r"x\y"), r"x\\y");
    }

    #[test]
    fn failed_rebalance_is_alerted() {
        let msg = format_alert(&SchedulerEvent::RebalanceFailed(failed_record())).unwrap();
        assert!(msg.contains("Rebalance failed"));
        assert!(msg.contains(r"`fund\-1`"));
        assert!(msg.contains("rejected"));
        assert!(msg.contains(r"execution reverted \(code 3\)"));
    }

    #[test]
    fn open_breaker_gets_its_own_title() {
        let event = SchedulerEvent::SnapshotFailed {
            portfolio_id: "alpha".into(),
            kind: ErrorKind::CircuitOpen,
            message: "breaker open".to_string(),
        };
        assert!(format_alert(&event).unwrap().starts_with("🔌"));
    }

    #[test]
    fn routine_events_are_silent() {
        let skip = SchedulerEvent::GateSkipped(GateSkip {
            portfolio_id: "alpha".into(),
            max_deviation: dec!(0.2),
            urgency: Urgency::High,
            impact: EstimatedImpact {
                trade_volume: dec!(100),
                estimated_cost: dec!(0.1),
                expected_improvement: Decimal::ZERO,
            },
        });
        assert!(format_alert(&skip).is_none());

        let info = SchedulerEvent::Log(events::LogMessage {
            timestamp: Utc::now(),
            level: LogLevel::Info,
            message: "tick".to_string(),
        });
        assert!(format_alert(&info).is_none());
    }

    #[test]
    fn report_is_forwarded() {
        let report = analytics::MetricsReport {
            generated_at: Utc::now(),
            window_ms: 21_600_000,
            attempts: 0,
            successes: 0,
            failures: 0,
            success_rate: Decimal::ZERO,
            by_urgency: BTreeMap::new(),
            average_duration_ms: None,
            totals: analytics::MetricsCounters::default(),
            recent_errors: Vec::new(),
            unhealthy_operations: Vec::new(),
        };
        let msg = format_alert(&SchedulerEvent::Report(report)).unwrap();
        assert!(msg.starts_with("📊 Rebalancing report"));
    }
}
