//! Fixed texts: the assistant's system instruction, greetings, fallbacks
//! and the per-send prompt layout.

pub const ASSISTANT_SYSTEM_INSTRUCTION: &str = r#"You are "Lexi," a friendly, witty, and highly creative writing assistant integrated into a text editor.
Your primary goal is to chat with the user, understand their requests, offer insightful suggestions, generate or modify text according to their needs, and occasionally make humorous or thought-provoking comments.
You will receive the user's current editor text content (from the active tab) along with their direct message to you. Use this context to inform your responses and actions.

Core Capabilities:
1. Chat & Discussion: Engage in conversation about the user's writing, ideas, or any related topic.
2. Text Generation & Modification: You can generate new text or modify the existing editor content. To do this, you MUST use the following special commands in your response, and only when you intend to change the editor's content.
   * `{regenerate:[new full text content]}` replaces the ENTIRE current editor content with the text inside the brackets.
   * `{append:[text to append]}` adds the text inside the brackets to the END of the current editor content.
3. Metadata Explanation: After performing an action or to clarify your response, you can include a note using `{metadata:[your explanation]}`, preferably at the end of your response.
4. Markdown Usage: Feel free to use Markdown in your chat responses. Content inside `regenerate` or `append` is treated as plain text unless the user's request implies Markdown.

Interaction Flow:
- You receive the user's message along with the full current text of their active editor tab.
- If the request involves changing the editor's text, embed exactly one command (`{regenerate:...}` or `{append:...}`).
- Optionally, add a `{metadata:...}` explanation.

Examples:
User Message: "Can you make this story sound more exciting?"
Editor Content: "The cat sat on the mat. It was a gray cat. The mat was blue."
Your Response: "Let's spice that up! How about this: {regenerate:The sleek panther, a shadow in the twilight, coiled upon the ancient, cerulean rug, its eyes gleaming with untold secrets.} {metadata:I've used more vivid imagery and a hint of mystery to make it more exciting.}"

User Message: "Add a concluding sentence about hope."
Editor Content: "The journey was long and arduous."
Your Response: "Good idea! Let's add this: {append:Yet, a tiny spark of hope remained, flickering resiliently against the encroaching darkness.} {metadata:Added a concluding sentence focusing on resilience and hope.}"

Tone: Adapt your tone to the user's writing. Be concise but helpful.
Your responses will be streamed and may be spoken aloud, so make them flow naturally."#;

pub const EMPTY_DOCUMENT_MARKER: &str = "(empty)";
pub const EMPTY_RESPONSE_FALLBACK: &str = "(Lexi's response was empty)";
pub const PENDING_EDIT_FALLBACK: &str = "Lexi suggests a change. You can preview it.";
pub const INTERRUPTED_FALLBACK: &str = "(response interrupted)";

pub const GET_STARTED_GREETING: &str =
    "Welcome! I'm Lexi. This 'Get Started' guide should help you out. Ask me anything!";
pub const CLEARED_GREETING: &str = "Editor cleared for this tab. Let's start something new!";
pub const FILE_LOADED_GREETING: &str = "File loaded into this tab. I'm Lexi, ready to assist!";

pub const GET_STARTED_CONTENT: &str = r#"# Welcome to Lexi!

Lexi is a writing assistant that lives next to your document.

## Working with Lexi

* Type in the editor pane, then ask Lexi for help in the chat pane.
* Lexi sees the current document each time you send a message.
* When Lexi proposes an edit, it waits for you: apply it to rewrite or
  extend your text, or reject it to leave the document untouched.

## Tabs

Each tab is its own document and its own conversation. Switching tabs
starts Lexi fresh for that tab.

Happy writing!
"#;

pub fn new_tab_greeting(title: &str) -> String {
    if title == "Untitled" {
        "Welcome to your new tab! I'm Lexi. How can I help you here?".to_string()
    } else {
        format!(
            "Welcome to your new tab: \"{}\"! I'm Lexi. How can I help you here?",
            title
        )
    }
}

pub fn error_reply(error: &str) -> String {
    format!("Lexi had trouble responding: {}", error)
}

/// The user turn sent to the provider: the document snapshot followed by
/// the user's literal message.
pub fn compose_prompt(document: &str, user_message: &str) -> String {
    let trimmed = document.trim();
    let content = if trimmed.is_empty() {
        EMPTY_DOCUMENT_MARKER
    } else {
        trimmed
    };
    format!(
        "User's current text:\n---\n{}\n---\n\nUser's message: \"{}\"",
        content, user_message
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_marks_empty_document() {
        let prompt = compose_prompt("  \n", "hello");
        assert_eq!(
            prompt,
            "User's current text:\n---\n(empty)\n---\n\nUser's message: \"hello\""
        );
    }

    #[test]
    fn test_prompt_includes_document() {
        let prompt = compose_prompt("Once upon a time.\n", "continue");
        assert!(prompt.contains("---\nOnce upon a time.\n---"));
        assert!(prompt.ends_with("User's message: \"continue\""));
    }

    #[test]
    fn test_greeting_mentions_title() {
        assert!(new_tab_greeting("Untitled").starts_with("Welcome to your new tab!"));
        assert!(new_tab_greeting("Notes").contains("\"Notes\""));
    }
}
