//! Per-channel message rendering for collection and payment reminders.

use chrono::{DateTime, Utc};

use relay_common::types::{ReminderRecord, ReminderType, TemplateParameter};

pub const PAYMENT_REMINDER_TEMPLATE: &str = "payment_reminder";

/// Approved template for each reminder milestone.
pub fn template_for(reminder_type: ReminderType) -> &'static str {
    match reminder_type {
        ReminderType::SevenDays => "collection_reminder_7_days",
        ReminderType::FourteenDays => "collection_reminder_14_days",
        ReminderType::ThirtyDays => "collection_reminder_30_days",
        ReminderType::Monthly => "collection_reminder_monthly",
        ReminderType::DisposalEligible => "disposal_warning",
    }
}

fn subject_for(reminder_type: ReminderType, order_id: &str) -> String {
    match reminder_type {
        ReminderType::DisposalEligible => {
            format!("Action required: order {} is eligible for disposal", order_id)
        }
        _ => format!("Reminder: order {} is ready for collection", order_id),
    }
}

/// Whole days since `completed`; zero when unknown or in the future.
pub fn days_uncollected(completed: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i64 {
    completed
        .map(|c| (now - c).num_days().max(0))
        .unwrap_or(0)
}

/// Both channel renderings of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub template_name: &'static str,
    pub parameters: Vec<TemplateParameter>,
    pub subject: String,
    pub html: String,
}

pub fn render_collection_reminder(record: &ReminderRecord, days: i64) -> RenderedMessage {
    let parameters = vec![
        TemplateParameter::new("customer_name", record.customer_name.as_str()),
        TemplateParameter::new("order_id", record.order_id.as_str()),
        TemplateParameter::new("days_uncollected", days.to_string()),
    ];

    let default_content = format!(
        "Your order {} has been ready for collection for {} day(s).",
        record.order_id, days
    );
    let content = record
        .message_content
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .unwrap_or(&default_content);

    let html = format!(
        "<p>Dear {},</p>\n<p>{}</p>\n<p>Order: <strong>{}</strong><br>Days uncollected: {}</p>",
        escape_html(&record.customer_name),
        paragraphs(content),
        escape_html(&record.order_id),
        days
    );

    RenderedMessage {
        template_name: template_for(record.reminder_type),
        parameters,
        subject: subject_for(record.reminder_type, &record.order_id),
        html,
    }
}

pub fn render_payment_reminder(
    customer_name: &str,
    order_id: &str,
    outstanding_cents: i64,
) -> RenderedMessage {
    let amount = format_amount(outstanding_cents);
    RenderedMessage {
        template_name: PAYMENT_REMINDER_TEMPLATE,
        parameters: vec![
            TemplateParameter::new("customer_name", customer_name),
            TemplateParameter::new("order_id", order_id),
            TemplateParameter::new("amount_due", amount.as_str()),
        ],
        subject: format!("Payment reminder for order {}", order_id),
        html: format!(
            "<p>Dear {},</p>\n<p>An outstanding balance of <strong>{}</strong> remains on order <strong>{}</strong>.</p>\n<p>Please settle it at your earliest convenience.</p>",
            escape_html(customer_name),
            amount,
            escape_html(order_id)
        ),
    }
}

/// Minor units to a two-decimal amount string.
pub fn format_amount(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

fn paragraphs(text: &str) -> String {
    escape_html(text.trim()).replace("\r\n", "\n").replace('\n', "<br>\n")
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use relay_common::types::ReminderStatus;
    use uuid::Uuid;

    fn record(reminder_type: ReminderType, content: Option<&str>) -> ReminderRecord {
        let now = Utc::now();
        ReminderRecord {
            id: Uuid::new_v4(),
            order_id: "O1".to_string(),
            customer_id: "C1".to_string(),
            customer_name: "Aisha <A>".to_string(),
            customer_phone: Some("0123456789".to_string()),
            reminder_type,
            scheduled_date: now,
            status: ReminderStatus::Pending,
            retry_count: 0,
            channel: None,
            sent_date: None,
            error_message: None,
            cancel_reason: None,
            message_content: content.map(str::to_string),
            claim_token: None,
            claimed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_template_lookup() {
        assert_eq!(template_for(ReminderType::SevenDays), "collection_reminder_7_days");
        assert_eq!(template_for(ReminderType::ThirtyDays), "collection_reminder_30_days");
        assert_eq!(template_for(ReminderType::DisposalEligible), "disposal_warning");
    }

    #[test]
    fn test_days_uncollected() {
        let now = Utc::now();
        assert_eq!(days_uncollected(None, now), 0);
        assert_eq!(days_uncollected(Some(now - Duration::hours(30)), now), 1);
        assert_eq!(days_uncollected(Some(now - Duration::days(30)), now), 30);
        assert_eq!(days_uncollected(Some(now + Duration::days(2)), now), 0);
    }

    #[test]
    fn test_collection_parameters_in_order() {
        let msg = render_collection_reminder(&record(ReminderType::ThirtyDays, None), 31);
        let names: Vec<_> = msg.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["customer_name", "order_id", "days_uncollected"]);
        assert_eq!(msg.parameters[2].value, "31");
        assert_eq!(msg.template_name, "collection_reminder_30_days");
    }

    #[test]
    fn test_email_body_uses_message_content_escaped() {
        let msg = render_collection_reminder(
            &record(ReminderType::SevenDays, Some("Line one\nLine <two>")),
            7,
        );
        assert!(msg.html.contains("Line one<br>\nLine &lt;two&gt;"));
        assert!(msg.html.contains("Dear Aisha &lt;A&gt;"));
    }

    #[test]
    fn test_email_body_default_content() {
        let msg = render_collection_reminder(&record(ReminderType::SevenDays, Some("  ")), 9);
        assert!(msg.html.contains("ready for collection for 9 day(s)"));
    }

    #[test]
    fn test_disposal_subject() {
        let msg = render_collection_reminder(&record(ReminderType::DisposalEligible, None), 90);
        assert!(msg.subject.contains("eligible for disposal"));
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(12345), "123.45");
        assert_eq!(format_amount(5), "0.05");
        assert_eq!(format_amount(-250), "-2.50");
    }

    #[test]
    fn test_payment_reminder_rendering() {
        let msg = render_payment_reminder("Ben", "O9", 9900);
        assert_eq!(msg.template_name, PAYMENT_REMINDER_TEMPLATE);
        assert_eq!(msg.parameters[2].value, "99.00");
        assert!(msg.html.contains("99.00"));
    }
}
