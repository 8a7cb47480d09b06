//! Adapter-native body mapping (spec §4.8: "map payload → adapter-native
//! body"). The payload contract is in scope; vendor-correct client
//! implementations are not — `sink::HttpNotifySink` posts whichever of
//! these shapes it's given to the channel's configured URL.

use backhaul_protocol::events::NotificationPayload;
use backhaul_protocol::model::ChannelKind;
use serde_json::{json, Value};

/// The adapter-native shape a rendered payload is mapped into before
/// being handed to a channel's transport.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelBody {
    /// Chat-style rich embed (Discord/Slack/Teams): colored card with a
    /// title, description and field table.
    Embed(Value),
    /// Plain-text line, for push-style channels with no rich formatting.
    PlainText(String),
    /// HTML body, for email.
    Html(String),
    /// URL-encoded form fields, for SMS gateways.
    FormEncoded(Vec<(String, String)>),
    /// Generic JSON body, for the catch-all webhook channel.
    Json(Value),
}

fn fields_as_json(payload: &NotificationPayload) -> Value {
    Value::Array(
        payload
            .fields
            .iter()
            .map(|field| {
                json!({
                    "name": field.name,
                    "value": field.value,
                    "inline": field.inline.unwrap_or(false),
                })
            })
            .collect(),
    )
}

fn plain_text_summary(payload: &NotificationPayload) -> String {
    let mut lines = vec![format!("{}: {}", payload.title, payload.message)];
    for field in &payload.fields {
        lines.push(format!("{}: {}", field.name, field.value));
    }
    lines.join("\n")
}

fn html_body(payload: &NotificationPayload) -> String {
    let mut rows = String::new();
    for field in &payload.fields {
        rows.push_str(&format!(
            "<tr><td><strong>{}</strong></td><td>{}</td></tr>",
            field.name, field.value
        ));
    }
    format!(
        "<h2>{}</h2><p>{}</p><table>{}</table>",
        payload.title, payload.message, rows
    )
}

/// Maps a rendered payload to the body shape `kind`'s transport expects.
pub fn map_channel_body(payload: &NotificationPayload, kind: ChannelKind) -> ChannelBody {
    match kind {
        ChannelKind::Discord => ChannelBody::Embed(json!({
            "embeds": [{
                "title": payload.title,
                "description": payload.message,
                "color": color_to_decimal(&payload.color),
                "fields": fields_as_json(payload),
            }]
        })),
        ChannelKind::Slack => ChannelBody::Embed(json!({
            "attachments": [{
                "color": payload.color,
                "title": payload.title,
                "text": payload.message,
                "fields": fields_as_json(payload),
            }]
        })),
        ChannelKind::Teams => ChannelBody::Embed(json!({
            "title": payload.title,
            "text": payload.message,
            "themeColor": payload.color.trim_start_matches('#'),
            "sections": [{ "facts": fields_as_json(payload) }],
        })),
        ChannelKind::Email => ChannelBody::Html(html_body(payload)),
        ChannelKind::Telegram | ChannelKind::Ntfy | ChannelKind::Gotify => {
            ChannelBody::PlainText(plain_text_summary(payload))
        }
        ChannelKind::TwilioSms => {
            let mut body = plain_text_summary(payload);
            body.truncate(480);
            ChannelBody::FormEncoded(vec![("Body".to_string(), body)])
        }
        ChannelKind::GenericWebhook => ChannelBody::Json(json!({
            "title": payload.title,
            "message": payload.message,
            "success": payload.success,
            "color": payload.color,
            "badge": payload.badge,
            "fields": fields_as_json(payload),
        })),
    }
}

fn color_to_decimal(hex: &str) -> u32 {
    u32::from_str_radix(hex.trim_start_matches('#'), 16).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use backhaul_protocol::events::PayloadField;

    fn sample_payload() -> NotificationPayload {
        NotificationPayload {
            title: "Backup succeeded".to_string(),
            message: "Backup of 'nightly-pg' completed successfully.".to_string(),
            success: true,
            color: "#2ecc71".to_string(),
            badge: Some("backup".to_string()),
            fields: vec![PayloadField {
                name: "Duration".to_string(),
                value: "42s".to_string(),
                inline: Some(true),
            }],
        }
    }

    #[test]
    fn discord_maps_to_an_embed_with_decimal_color() {
        let body = map_channel_body(&sample_payload(), ChannelKind::Discord);
        match body {
            ChannelBody::Embed(value) => {
                assert_eq!(value["embeds"][0]["color"], 0x2ecc71);
            }
            other => panic!("expected Embed, got {other:?}"),
        }
    }

    #[test]
    fn email_maps_to_html_containing_the_title() {
        let body = map_channel_body(&sample_payload(), ChannelKind::Email);
        match body {
            ChannelBody::Html(html) => assert!(html.contains("Backup succeeded")),
            other => panic!("expected Html, got {other:?}"),
        }
    }

    #[test]
    fn twilio_sms_maps_to_a_truncated_form_body() {
        let body = map_channel_body(&sample_payload(), ChannelKind::TwilioSms);
        match body {
            ChannelBody::FormEncoded(fields) => {
                assert_eq!(fields[0].0, "Body");
                assert!(fields[0].1.len() <= 480);
            }
            other => panic!("expected FormEncoded, got {other:?}"),
        }
    }

    #[test]
    fn generic_webhook_maps_to_json_preserving_success_flag() {
        let body = map_channel_body(&sample_payload(), ChannelKind::GenericWebhook);
        match body {
            ChannelBody::Json(value) => assert_eq!(value["success"], true),
            other => panic!("expected Json, got {other:?}"),
        }
    }

    #[test]
    fn every_channel_kind_maps_without_panicking() {
        for kind in [
            ChannelKind::Email,
            ChannelKind::Discord,
            ChannelKind::Slack,
            ChannelKind::Telegram,
            ChannelKind::Teams,
            ChannelKind::Ntfy,
            ChannelKind::Gotify,
            ChannelKind::TwilioSms,
            ChannelKind::GenericWebhook,
        ] {
            let _ = map_channel_body(&sample_payload(), kind);
        }
    }
}
