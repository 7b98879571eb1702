//! Prompt rendering for the Claude CLI.
//!
//! The CLI takes a single prompt on stdin rather than structured chat
//! messages, so the conversation is flattened into a System/Human/Assistant
//! transcript before dispatch.

use crate::server::openai_api::ChatMessage;

/// Render a conversation into the prompt text fed to the CLI.
///
/// The first system message becomes a `System:` preamble (later system
/// messages are dropped), user and assistant turns become `Human:` and
/// `Assistant:` blocks, and a trailing `Assistant:` cues the reply.
pub fn render_prompt(messages: &[ChatMessage]) -> String {
    let mut parts: Vec<String> = Vec::new();

    let system = messages.iter().find_map(|message| match message {
        ChatMessage::System { content } => Some(content),
        _ => None,
    });
    if let Some(content) = system {
        parts.push(format!("System: {content}\n"));
    }

    for message in messages {
        match message {
            ChatMessage::System { .. } => {}
            ChatMessage::User { content } => parts.push(format!("Human: {content}\n")),
            ChatMessage::Assistant { content } => parts.push(format!("Assistant: {content}\n")),
        }
    }

    parts.push("Assistant:".to_string());
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_user_message() {
        let messages = vec![ChatMessage::User {
            content: "What is the capital of France?".to_string(),
        }];
        assert_eq!(
            render_prompt(&messages),
            "Human: What is the capital of France?\n\nAssistant:"
        );
    }

    #[test]
    fn test_system_preamble_comes_first() {
        let messages = vec![
            ChatMessage::User {
                content: "Hi".to_string(),
            },
            ChatMessage::System {
                content: "Be terse.".to_string(),
            },
        ];
        assert_eq!(
            render_prompt(&messages),
            "System: Be terse.\n\nHuman: Hi\n\nAssistant:"
        );
    }

    #[test]
    fn test_multi_turn_conversation() {
        let messages = vec![
            ChatMessage::System {
                content: "You are helpful.".to_string(),
            },
            ChatMessage::User {
                content: "One".to_string(),
            },
            ChatMessage::Assistant {
                content: "Two".to_string(),
            },
            ChatMessage::User {
                content: "Three".to_string(),
            },
        ];
        assert_eq!(
            render_prompt(&messages),
            "System: You are helpful.\n\nHuman: One\n\nAssistant: Two\n\nHuman: Three\n\nAssistant:"
        );
    }

    #[test]
    fn test_later_system_messages_dropped() {
        let messages = vec![
            ChatMessage::System {
                content: "First".to_string(),
            },
            ChatMessage::User {
                content: "Q".to_string(),
            },
            ChatMessage::System {
                content: "Second".to_string(),
            },
        ];
        let prompt = render_prompt(&messages);
        assert!(prompt.contains("System: First"));
        assert!(!prompt.contains("Second"));
    }

    #[test]
    fn test_trailing_cue_always_present() {
        assert_eq!(render_prompt(&[]), "Assistant:");
    }
}
