//! Telegram HTML rendering of risk events.

use chrono::{DateTime, FixedOffset, Utc};
use guard_core::{BreachReason, ExitReason, RiskEvent};
use rust_decimal::Decimal;

/// Renders events as Telegram HTML, with times shown at a fixed offset.
#[derive(Debug, Clone, Copy)]
pub struct MessageRenderer {
    offset: FixedOffset,
}

impl MessageRenderer {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// `now` stamps events that carry no time of their own.
    pub fn render(&self, event: &RiskEvent, now: DateTime<Utc>) -> String {
        let now = now.with_timezone(&self.offset);
        let clock = now.format("%I:%M:%S %p");

        match event {
            RiskEvent::Startup {
                daily_stoploss,
                daily_target,
                check_interval_secs,
                market_open,
                market_close,
                kill_switch_enabled,
            } => format!(
                "🤖 <b>Dhan Risk Manager Started</b>\n\n\
                 📊 <b>Configuration:</b>\n\
                 \u{20}  🔴 Stoploss: {}\n\
                 \u{20}  🟢 Target: {}\n\
                 \u{20}  ⏱ Check Interval: {} second(s)\n\
                 \u{20}  🛑 Kill Switch: {}\n\n\
                 🕐 Market Hours: {} - {}\n\n\
                 ✅ Monitoring active\n\
                 ⏰ Started: {}",
                rupees(*daily_stoploss),
                rupees(*daily_target),
                check_interval_secs,
                if *kill_switch_enabled { "Enabled" } else { "Disabled" },
                market_open.format("%H:%M"),
                market_close.format("%H:%M"),
                clock
            ),

            RiskEvent::PnlUpdate {
                pnl,
                stoploss,
                target,
                top_positions,
                remaining,
                at,
            } => {
                let (emoji, label) = if *pnl > Decimal::ZERO {
                    ("📈", "Profit")
                } else if *pnl < Decimal::ZERO {
                    ("📉", "Loss")
                } else {
                    ("➖", "Breakeven")
                };
                let (to_stoploss, to_target) = distances(*pnl, *stoploss, *target);

                let mut message = format!(
                    "{emoji} <b>PNL Update</b> {emoji}\n\n\
                     💰 <b>Current P&amp;L:</b> {} ({})\n\n\
                     📊 <b>Risk Limits:</b>\n\
                     \u{20}  🔴 Stoploss: {} ({:.1}% away)\n\
                     \u{20}  🟢 Target: {} ({:.1}% away)\n\n\
                     ⏰ Time: {}",
                    rupees(*pnl),
                    label,
                    rupees(*stoploss),
                    to_stoploss.round_dp(1),
                    rupees(*target),
                    to_target.round_dp(1),
                    at.with_timezone(&self.offset).format("%I:%M:%S %p"),
                );

                if !top_positions.is_empty() {
                    message.push_str("\n\n📋 <b>Positions:</b>");
                    for position in top_positions {
                        let marker = if position.total_pnl >= Decimal::ZERO {
                            "🟢"
                        } else {
                            "🔴"
                        };
                        message.push_str(&format!(
                            "\n   {} {}: {}",
                            marker,
                            escape(&position.symbol),
                            rupees(position.total_pnl)
                        ));
                        let status = position.status.label();
                        if !status.is_empty() {
                            message.push_str(&format!(" [{}]", status));
                        }
                    }
                    if *remaining > 0 {
                        message.push_str(&format!("\n   ... and {} more", remaining));
                    }
                }
                message
            }

            RiskEvent::TrailingUpdate {
                previous,
                new_level,
                pnl,
            } => format!(
                "🔼 <b>Trailing Stoploss Raised</b>\n\n\
                 💰 P&amp;L: {}\n\
                 🔴 Stoploss: {} → {}\n\n\
                 ⏰ Time: {}",
                rupees(*pnl),
                rupees(*previous),
                rupees(*new_level),
                clock
            ),

            RiskEvent::ThresholdBreach {
                reason,
                pnl,
                limit,
                kill_switch_enabled,
            } => {
                let (emoji, title, color) = match reason {
                    BreachReason::Stoploss => ("🚨", "STOPLOSS BREACHED", "🔴"),
                    BreachReason::Target => ("🎯", "TARGET ACHIEVED", "🟢"),
                };
                let (kill_switch, last_step, stop) = if *kill_switch_enabled {
                    (
                        "⚡ <b>KILL SWITCH ACTIVATING!</b>",
                        "3️⃣ Disabling trading for today",
                        "🛑 <b>Monitoring stops once the kill switch is confirmed</b>",
                    )
                } else {
                    (
                        "⚠️ <b>Kill switch not enabled</b>",
                        "3️⃣ Trading stays enabled",
                        "🛑 <b>Monitoring stops after this check</b>",
                    )
                };
                format!(
                    "{e}{e}{e} <b>{title}</b> {e}{e}{e}\n\n\
                     {color} <b>P&amp;L:</b> {}\n\
                     {color} <b>Limit:</b> {}\n\n\
                     {kill_switch}\n\n\
                     <b>Actions being taken:</b>\n\
                     1️⃣ Cancelling all pending orders\n\
                     2️⃣ Squaring off all positions\n\
                     {last_step}\n\n\
                     ⏰ Time: {}\n\
                     📅 Date: {}\n\n\
                     {stop}",
                    rupees(*pnl),
                    rupees(*limit),
                    clock,
                    now.format("%d %B %Y"),
                    e = emoji,
                )
            }

            RiskEvent::PositionExit {
                symbol,
                reason,
                percent,
                order_id,
            } => {
                let (emoji, title) = match reason {
                    ExitReason::TakeProfit => ("🎯", "Position Take-Profit"),
                    ExitReason::Stoploss => ("🛑", "Position Stoploss"),
                };
                format!(
                    "{emoji} <b>{title}</b>\n\n\
                     📌 {}\n\
                     📊 P&amp;L: {:.2}% of invested value\n\
                     🧾 Order ID: {}\n\n\
                     ⏰ Time: {}",
                    escape(symbol),
                    percent.round_dp(2),
                    escape(order_id),
                    clock
                )
            }

            RiskEvent::ActionFailure { action, detail } => format!(
                "⚠️ <b>Action Failed</b>\n\n\
                 ❌ {}: {}\n\n\
                 ⏰ Time: {}\n\n\
                 ⚠️ Check open orders and positions manually",
                escape(action),
                escape(detail),
                clock
            ),

            RiskEvent::Error { message } => format!(
                "⚠️ <b>Error Alert</b>\n\n\
                 ❌ {}\n\n\
                 ⏰ Time: {}\n\n\
                 ⚠️ Please check the logs or system",
                escape(message),
                clock
            ),
        }
    }
}

/// Percent distance from the stoploss and to the target.
fn distances(pnl: Decimal, stoploss: Decimal, target: Decimal) -> (Decimal, Decimal) {
    let to_stoploss = if stoploss.is_zero() {
        Decimal::ZERO
    } else {
        (pnl - stoploss) / stoploss.abs() * Decimal::ONE_HUNDRED
    };
    let to_target = if target.is_zero() {
        Decimal::ZERO
    } else {
        (target - pnl) / target * Decimal::ONE_HUNDRED
    };
    (to_stoploss, to_target)
}

/// `₹1,234.50` style amount.
pub fn rupees(amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    let text = format!("{:.2}", rounded.abs());
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    format!("{}₹{}.{}", sign, grouped, fraction)
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone};
    use guard_core::types::PositionStatus;
    use guard_core::PositionSummary;

    fn renderer() -> MessageRenderer {
        MessageRenderer::new(FixedOffset::east_opt(330 * 60).unwrap())
    }

    fn at() -> DateTime<Utc> {
        // 10:00:00 IST
        Utc.with_ymd_and_hms(2024, 6, 3, 4, 30, 0).unwrap()
    }

    #[test]
    fn test_rupee_formatting() {
        assert_eq!(rupees(Decimal::new(123456789, 2)), "₹1,234,567.89");
        assert_eq!(rupees(Decimal::new(-15005, 1)), "-₹1,500.50");
        assert_eq!(rupees(Decimal::new(999, 0)), "₹999.00");
        assert_eq!(rupees(Decimal::ZERO), "₹0.00");
    }

    #[test]
    fn test_pnl_update_message() {
        let event = RiskEvent::PnlUpdate {
            pnl: Decimal::new(500, 0),
            stoploss: Decimal::new(-1000, 0),
            target: Decimal::new(2000, 0),
            top_positions: vec![
                PositionSummary {
                    symbol: "BANKNIFTY".to_string(),
                    total_pnl: Decimal::new(1500, 0),
                    status: PositionStatus::Open,
                },
                PositionSummary {
                    symbol: "FINNIFTY".to_string(),
                    total_pnl: Decimal::new(-200, 0),
                    status: PositionStatus::Unknown,
                },
            ],
            remaining: 3,
            at: at(),
        };
        let message = renderer().render(&event, at());

        assert!(message.contains("<b>PNL Update</b>"));
        assert!(message.contains("₹500.00 (Profit)"));
        assert!(message.contains("(150.0% away)"));
        assert!(message.contains("(75.0% away)"));
        assert!(message.contains("10:00:00 AM"));
        assert!(message.contains("🟢 BANKNIFTY: ₹1,500.00 [OPEN]"));
        assert!(message.contains("🔴 FINNIFTY: -₹200.00\n"));
        assert!(message.contains("... and 3 more"));
    }

    #[test]
    fn test_breach_message_reflects_kill_switch() {
        let event = RiskEvent::ThresholdBreach {
            reason: BreachReason::Stoploss,
            pnl: Decimal::new(-1100, 0),
            limit: Decimal::new(-1000, 0),
            kill_switch_enabled: false,
        };
        let message = renderer().render(&event, at());
        assert!(message.contains("STOPLOSS BREACHED"));
        assert!(message.contains("Kill switch not enabled"));
        assert!(message.contains("Monitoring stops after this check"));
        assert!(message.contains("03 June 2024"));

        let event = RiskEvent::ThresholdBreach {
            reason: BreachReason::Target,
            pnl: Decimal::new(2100, 0),
            limit: Decimal::new(2000, 0),
            kill_switch_enabled: true,
        };
        let message = renderer().render(&event, at());
        assert!(message.contains("TARGET ACHIEVED"));
        assert!(message.contains("KILL SWITCH ACTIVATING"));
        assert!(message.contains("Monitoring stops once the kill switch is confirmed"));
        assert!(!message.contains("after this check"));
    }

    #[test]
    fn test_startup_and_error_messages() {
        let event = RiskEvent::Startup {
            daily_stoploss: Decimal::new(-1000, 0),
            daily_target: Decimal::new(2000, 0),
            check_interval_secs: 30,
            market_open: NaiveTime::from_hms_opt(9, 15, 0).unwrap(),
            market_close: NaiveTime::from_hms_opt(15, 30, 0).unwrap(),
            kill_switch_enabled: true,
        };
        let message = renderer().render(&event, at());
        assert!(message.contains("Market Hours: 09:15 - 15:30"));
        assert!(message.contains("Check Interval: 30 second(s)"));

        let event = RiskEvent::Error {
            message: "Failed to fetch <positions> & orders".to_string(),
        };
        let message = renderer().render(&event, at());
        assert!(message.contains("Failed to fetch &lt;positions&gt; &amp; orders"));
    }
}
