//! Telegram report delivery
//!
//! Renders the run's reconciled prices into the Vietnamese market report
//! and posts it to the Telegram Bot API. Formatting is pure; delivery
//! failures are reported to the caller, not retried here.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use serde_json::json;
use tracing::info;

use crate::types::{Market, ReconciledPrice, Unit};

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Vietnam timezone offset (GMT+7) for report timestamps
const VN_OFFSET_SECS: i32 = 7 * 3600;

pub struct TelegramNotifier {
    client: reqwest::Client,
    token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(client: reqwest::Client, token: String, chat_id: String) -> Self {
        Self { client, token, chat_id }
    }

    /// Construct from the standard environment variables
    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        let token = std::env::var("TELEGRAM_BOT_TOKEN")
            .context("TELEGRAM_BOT_TOKEN is not set")?;
        let chat_id = std::env::var("TELEGRAM_CHAT_ID")
            .context("TELEGRAM_CHAT_ID is not set")?;
        Ok(Self::new(client, token, chat_id))
    }

    /// Send one Markdown message to the configured chat
    pub async fn send(&self, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", TELEGRAM_API, self.token);
        let body = json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "Markdown",
            "disable_web_page_preview": true,
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("Failed to reach Telegram API")?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            bail!("Telegram API returned {}: {}", status, detail);
        }

        info!(chars = text.len(), "Telegram message sent");
        Ok(())
    }
}

/// Render the run's prices into the Telegram report.
///
/// Pure function of its inputs; markets are rendered in the order given
/// so the report layout is stable across runs.
pub fn format_report(prices: &[ReconciledPrice], generated_at: DateTime<Utc>) -> String {
    let vn_time = generated_at.with_timezone(
        &FixedOffset::east_opt(VN_OFFSET_SECS).expect("valid fixed offset"),
    );

    let mut msg = String::from("☕ *BÁO GIÁ CÀ PHÊ*\n");
    msg.push_str(&format!("📅 {} (GMT+7)\n\n", vn_time.format("%d/%m/%Y %H:%M")));

    let (international, domestic): (Vec<_>, Vec<_>) =
        prices.iter().partition(|p| !p.market.is_domestic());

    for price in &international {
        msg.push_str(&format_market(price));
    }

    if !domestic.is_empty() {
        msg.push_str("🇻🇳 *GIÁ CÀ PHÊ TRONG NƯỚC*\n\n");
        for price in &domestic {
            msg.push_str(&format_market(price));
        }
    }

    let live = prices.iter().filter(|p| p.confidence > 0.0).count();
    if live > 0 {
        msg.push_str(&format!("✅ Cập nhật thành công {}/{} thị trường\n", live, prices.len()));
    } else {
        msg.push_str("❌ Không thể cập nhật dữ liệu từ các nguồn\n");
    }
    msg.push_str("\n🤖 Tự động cập nhật bởi CafeBot");
    msg
}

fn format_market(price: &ReconciledPrice) -> String {
    let emoji = match price.market {
        Market::RobustaLondon | Market::RobustaVietnam => "🌱",
        Market::ArabicaNewYork | Market::ArabicaVietnam => "☕",
    };

    let mut block = format!("{} *{}*\n", emoji, price.market.name_vi());

    match price.unit {
        Unit::UsdPerTonne => {
            block.push_str(&format!("💰 Giá: ${}/tấn\n", fmt_num(price.value, 2)));
            block.push_str(&format!("💸 VND: {}/tấn\n", fmt_num(price.value_vnd, 0)));
        }
        Unit::CentsPerLb => {
            block.push_str(&format!("💰 Giá: {} cents/lb\n", fmt_num(price.value, 2)));
            block.push_str(&format!("💸 VND: {}/tấn\n", fmt_num(price.value_vnd, 0)));
        }
        Unit::VndPerKg => {
            block.push_str(&format!("💰 Giá: {} VND/kg\n", fmt_num(price.value, 0)));
        }
    }

    if let (Some(abs), Some(pct)) = (price.change_abs, price.change_pct) {
        let arrow = if abs >= 0.0 { "📈" } else { "📉" };
        block.push_str(&format!(
            "{} Thay đổi: {}{} ({}{:.2}%)\n",
            arrow,
            if abs >= 0.0 { "+" } else { "" },
            fmt_num(abs, 2),
            if pct >= 0.0 { "+" } else { "" },
            pct
        ));
    }

    if price.confidence > 0.0 {
        block.push_str(&format!("📊 Độ tin cậy: {:.0}%\n", price.confidence * 100.0));
        if !price.sources.is_empty() {
            let names: Vec<String> = price.sources.iter().map(|s| s.to_string()).collect();
            block.push_str(&format!("🔍 Nguồn: {}\n", names.join(", ")));
        }
    } else if price.carried_forward {
        block.push_str("⚠️ Giữ giá kỳ trước (không có dữ liệu mới)\n");
    } else {
        block.push_str("⚠️ Giá ước tính (không có dữ liệu)\n");
    }

    block.push('\n');
    block
}

/// Format with comma thousands separators and fixed decimals
fn fmt_num(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (formatted.as_str(), None),
    };

    let mut grouped = String::new();
    let digits: Vec<char> = int_part.chars().collect();
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*c);
    }

    let sign = if value < 0.0 { "-" } else { "" };
    match frac_part {
        Some(f) => format!("{}{}.{}", sign, grouped, f),
        None => format!("{}{}", sign, grouped),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Source;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 1, 0, 0).unwrap()
    }

    fn robusta(confidence: f64) -> ReconciledPrice {
        ReconciledPrice {
            market: Market::RobustaLondon,
            value: 5078.0,
            unit: Unit::UsdPerTonne,
            value_vnd: 121_872_000.0,
            confidence,
            sources: vec![Source::Investing, Source::Vietstock],
            change_abs: Some(78.0),
            change_pct: Some(1.56),
            carried_forward: false,
            computed_at: now(),
        }
    }

    #[test]
    fn test_fmt_num_grouping() {
        assert_eq!(fmt_num(5078.0, 2), "5,078.00");
        assert_eq!(fmt_num(121_872_000.0, 0), "121,872,000");
        assert_eq!(fmt_num(-78.5, 2), "-78.50");
        assert_eq!(fmt_num(245.0, 0), "245");
    }

    #[test]
    fn test_report_contains_price_and_sources() {
        let report = format_report(&[robusta(0.9)], now());
        assert!(report.contains("BÁO GIÁ CÀ PHÊ"));
        assert!(report.contains("$5,078.00/tấn"));
        assert!(report.contains("121,872,000/tấn"));
        assert!(report.contains("Độ tin cậy: 90%"));
        assert!(report.contains("investing.com"));
        assert!(report.contains("+78.00"));
        // 8AM Vietnam when generated at 01:00 UTC
        assert!(report.contains("01/06/2024 08:00"));
    }

    #[test]
    fn test_report_marks_carried_forward() {
        let mut price = robusta(0.0);
        price.sources = Vec::new();
        price.carried_forward = true;
        let report = format_report(&[price], now());
        assert!(report.contains("Giữ giá kỳ trước"));
        assert!(report.contains("❌ Không thể cập nhật"));
    }

    #[test]
    fn test_domestic_section_rendered_separately() {
        let domestic = ReconciledPrice {
            market: Market::RobustaVietnam,
            value: 58_000.0,
            unit: Unit::VndPerKg,
            value_vnd: 58_000.0,
            confidence: 0.7,
            sources: vec![Source::CafeF],
            change_abs: None,
            change_pct: None,
            carried_forward: false,
            computed_at: now(),
        };
        let report = format_report(&[robusta(0.9), domestic], now());
        assert!(report.contains("GIÁ CÀ PHÊ TRONG NƯỚC"));
        assert!(report.contains("58,000 VND/kg"));
        assert!(report.contains("✅ Cập nhật thành công 2/2 thị trường"));
    }

    #[test]
    fn test_report_order_is_stable() {
        let a = format_report(&[robusta(0.9)], now());
        let b = format_report(&[robusta(0.9)], now());
        assert_eq!(a, b);
    }
}
