//! Conversion of caller-supplied turns into model messages.

use crate::models::{Message, Role, Turn};

/// Map turns to messages, preserving order and length.
///
/// Sender `"user"` becomes [`Role::User`]; every other sender is the model.
pub fn format_history(turns: &[Turn]) -> Vec<Message> {
    turns
        .iter()
        .map(|turn| Message {
            role: if turn.sender == "user" {
                Role::User
            } else {
                Role::Model
            },
            text: turn.content.clone(),
        })
        .collect()
}

/// Full upstream message list: formatted history followed by the new user input.
pub fn build_messages(history: &[Turn], user_input: &str) -> Vec<Message> {
    let mut messages = format_history(history);
    messages.push(Message::user(user_input));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(sender: &str, content: &str) -> Turn {
        Turn {
            sender: sender.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn user_sender_maps_to_user_role() {
        let messages = format_history(&[turn("user", "hi")]);
        assert_eq!(messages, vec![Message::user("hi")]);
    }

    #[test]
    fn assistant_sender_maps_to_model_role() {
        let messages = format_history(&[turn("assistant", "hello")]);
        assert_eq!(messages, vec![Message::model("hello")]);
    }

    #[test]
    fn unknown_sender_maps_to_model_role() {
        let messages = format_history(&[turn("system", "x"), turn("User", "y")]);
        assert!(messages.iter().all(|m| m.role == Role::Model));
    }

    #[test]
    fn preserves_order_length_and_empty_content() {
        let turns = vec![
            turn("user", "first"),
            turn("assistant", ""),
            turn("user", "third"),
        ];

        let messages = format_history(&turns);
        assert_eq!(messages.len(), turns.len());
        assert_eq!(messages[0].text, "first");
        assert_eq!(messages[1], Message::model(""));
        assert_eq!(messages[2].text, "third");
    }

    #[test]
    fn empty_history_yields_no_messages() {
        assert!(format_history(&[]).is_empty());
    }

    #[test]
    fn build_messages_appends_current_input() {
        let messages = build_messages(&[turn("assistant", "earlier")], "now");
        assert_eq!(
            messages,
            vec![Message::model("earlier"), Message::user("now")]
        );
    }
}
