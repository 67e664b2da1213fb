//! Outbound message envelopes for the WhatsApp Cloud API.

use serde::Serialize;
use twiga_common::Reply;

const BUTTON_FOOTER: &str = "This is an automatic message 🦒";
const LIST_FOOTER: &str = "This is an automated message 🦒";
const LIST_BUTTON: &str = "Options";

/// Reply buttons allowed per interactive button message.
pub const MAX_BUTTONS: usize = 3;
/// Character limit of a reply-button title.
pub const MAX_BUTTON_TITLE: usize = 20;
/// Character limit of a list-row title.
pub const MAX_ROW_TITLE: usize = 24;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    Text(TextMessage),
    Interactive(InteractiveMessage),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextMessage {
    pub messaging_product: &'static str,
    pub recipient_type: &'static str,
    pub to: String,
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub text: TextBody,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextBody {
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractiveMessage {
    pub messaging_product: &'static str,
    pub recipient_type: &'static str,
    pub to: String,
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub interactive: Interactive,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Interactive {
    Button {
        body: TextObject,
        footer: TextObject,
        action: ButtonsAction,
    },
    List {
        body: TextObject,
        footer: TextObject,
        action: ListAction,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextObject {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ButtonsAction {
    pub buttons: Vec<Button>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Button {
    #[serde(rename = "type")]
    pub button_type: &'static str,
    pub reply: ButtonReply,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ButtonReply {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListAction {
    pub button: String,
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Section {
    pub title: String,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub id: String,
    pub title: String,
}

pub fn text_message(to: &str, text: &str) -> OutboundMessage {
    OutboundMessage::Text(TextMessage {
        messaging_product: "whatsapp",
        recipient_type: "individual",
        to: to.to_string(),
        msg_type: "text",
        text: TextBody {
            body: text.to_string(),
        },
    })
}

pub fn interactive_button_message(to: &str, text: &str, options: &[String]) -> OutboundMessage {
    let buttons = options
        .iter()
        .enumerate()
        .map(|(i, opt)| Button {
            button_type: "reply",
            reply: ButtonReply {
                id: format!("option-{i}"),
                title: truncate_chars(opt, MAX_BUTTON_TITLE),
            },
        })
        .collect();

    interactive(
        to,
        Interactive::Button {
            body: TextObject {
                text: text.to_string(),
            },
            footer: TextObject {
                text: BUTTON_FOOTER.to_string(),
            },
            action: ButtonsAction { buttons },
        },
    )
}

pub fn interactive_list_message(
    to: &str,
    text: &str,
    options: &[String],
    title: &str,
) -> OutboundMessage {
    let rows = options
        .iter()
        .enumerate()
        .map(|(i, opt)| Row {
            id: format!("option-{i}"),
            title: truncate_chars(opt, MAX_ROW_TITLE),
        })
        .collect();

    interactive(
        to,
        Interactive::List {
            body: TextObject {
                text: text.to_string(),
            },
            footer: TextObject {
                text: LIST_FOOTER.to_string(),
            },
            action: ListAction {
                button: LIST_BUTTON.to_string(),
                sections: vec![Section {
                    title: title.to_string(),
                    rows,
                }],
            },
        },
    )
}

/// Pick the envelope for a reply: plain text without options, buttons for up
/// to three options, a scrollable list beyond that.
pub fn reply_message(to: &str, reply: &Reply) -> OutboundMessage {
    match reply.options.as_deref() {
        None | Some([]) => text_message(to, &reply.text),
        Some(options) if options.len() <= MAX_BUTTONS => {
            interactive_button_message(to, &reply.text, options)
        }
        Some(options) => interactive_list_message(to, &reply.text, options, LIST_BUTTON),
    }
}

fn interactive(to: &str, interactive: Interactive) -> OutboundMessage {
    OutboundMessage::Interactive(InteractiveMessage {
        messaging_product: "whatsapp",
        recipient_type: "individual",
        to: to.to_string(),
        msg_type: "interactive",
        interactive,
    })
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn text_message_matches_cloud_api_shape() {
        let value = serde_json::to_value(text_message("255700000001", "Habari")).unwrap();
        assert_eq!(
            value,
            json!({
                "messaging_product": "whatsapp",
                "recipient_type": "individual",
                "to": "255700000001",
                "type": "text",
                "text": { "body": "Habari" }
            })
        );
    }

    #[test]
    fn button_message_numbers_options_and_sets_footer() {
        let msg = interactive_button_message("1", "Pick one", &options(&["Yes", "No"]));
        let value = serde_json::to_value(msg).unwrap();

        assert_eq!(value["type"], "interactive");
        assert_eq!(value["interactive"]["type"], "button");
        assert_eq!(value["interactive"]["body"]["text"], "Pick one");
        assert_eq!(value["interactive"]["footer"]["text"], BUTTON_FOOTER);
        assert_eq!(
            value["interactive"]["action"]["buttons"][1],
            json!({ "type": "reply", "reply": { "id": "option-1", "title": "No" } })
        );
    }

    #[test]
    fn list_message_wraps_rows_in_one_section() {
        let msg = interactive_list_message("1", "Choose", &options(&["a", "b", "c", "d"]), "Grades");
        let value = serde_json::to_value(msg).unwrap();

        assert_eq!(value["interactive"]["type"], "list");
        assert_eq!(value["interactive"]["action"]["button"], "Options");
        assert_eq!(value["interactive"]["footer"]["text"], LIST_FOOTER);
        let section = &value["interactive"]["action"]["sections"][0];
        assert_eq!(section["title"], "Grades");
        assert_eq!(section["rows"].as_array().unwrap().len(), 4);
        assert_eq!(section["rows"][3]["id"], "option-3");
    }

    #[test]
    fn titles_are_truncated_to_platform_limits() {
        let long = "An extremely long option title that overflows".to_string();
        let OutboundMessage::Interactive(msg) =
            interactive_button_message("1", "x", std::slice::from_ref(&long))
        else {
            panic!("expected interactive message");
        };
        let Interactive::Button { action, .. } = msg.interactive else {
            panic!("expected button message");
        };
        assert_eq!(action.buttons[0].reply.title.chars().count(), MAX_BUTTON_TITLE);
    }

    #[test]
    fn reply_message_routes_by_option_count() {
        let plain = reply_message("1", &Reply::text("hi"));
        assert!(matches!(plain, OutboundMessage::Text(_)));

        let buttons = reply_message("1", &Reply::with_options("hi", options(&["a", "b", "c"])));
        assert!(matches!(
            buttons,
            OutboundMessage::Interactive(InteractiveMessage {
                interactive: Interactive::Button { .. },
                ..
            })
        ));

        let list = reply_message("1", &Reply::with_options("hi", options(&["a", "b", "c", "d"])));
        assert!(matches!(
            list,
            OutboundMessage::Interactive(InteractiveMessage {
                interactive: Interactive::List { .. },
                ..
            })
        ));
    }
}
