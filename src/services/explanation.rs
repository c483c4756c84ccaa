use std::sync::Arc;

use futures_util::{Stream, StreamExt};

use crate::services::llm::{ChatMessage, ChatRequest, CompletionClient, Purpose};

const EXPLANATION_SYSTEM_PROMPT: &str = r#"You are an expert at mathematics and problem solving. Format every answer as GitHub-Flavored Markdown (GFM):

1. Use valid GFM syntax for all formatting.
2. Put block math in fenced code blocks tagged math:
   ```math
   x = \frac{-b \pm \sqrt{b^2-4ac}}{2a}
   ```
3. Write inline math as single backticks around dollar delimiters: `$x^2$`
4. Use '#' headings.
5. Leave a blank line before and after lists.
6. Use ** for bold and * for italics.
7. Fence code examples and name their language.
8. Use > for blockquotes.
9. Separate sections with blank lines.
"#;

/// One server-sent event of an explanation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ExplanationFrame {
    Fragment(String),
    Done,
}

pub(crate) fn explanation_request(problem: &str) -> ChatRequest {
    ChatRequest {
        purpose: Purpose::Explanation,
        messages: vec![
            ChatMessage::system(EXPLANATION_SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Explain how to solve this problem in detail, using proper markdown formatting:\n\n{problem}"
            )),
        ],
        json_mode: false,
    }
}

/// Relays upstream fragments as they arrive and always finishes with exactly
/// one `Done`. Upstream failures end the relay early; they are logged, not sent.
pub(crate) fn explanation_frames(
    llm: Arc<dyn CompletionClient>,
    problem: String,
) -> impl Stream<Item = ExplanationFrame> + Send {
    async_stream::stream! {
        let mut relayed = 0usize;

        match llm.stream(explanation_request(&problem)).await {
            Ok(mut fragments) => {
                while let Some(fragment) = fragments.next().await {
                    match fragment {
                        Ok(text) => {
                            relayed += 1;
                            yield ExplanationFrame::Fragment(text);
                        }
                        Err(err) => {
                            tracing::error!(error = %err, relayed, "Explanation stream broke off");
                            break;
                        }
                    }
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to open explanation stream");
            }
        }

        tracing::info!(relayed, "Explanation stream finished");
        yield ExplanationFrame::Done;
    }
}
