use crate::llm::types::{ChatMessage, ContentPart, ImageUrl};
use crate::perception::screenshot::Screenshot;

/// System prompt for the streamed answer: free text, then one inline marker.
pub fn streaming_system_prompt(product: &str, screenshot: Option<&Screenshot>) -> String {
    let mut prompt = format!(
        "\
You are an assistant helping users with {product}. You help them locate UI elements, \
understand features, and answer questions.

Rules:
- Answer in plain, concise prose.
- When the user asks where something is and it is visible in the screenshot, end your answer \
with exactly one marker of the form [BBOX:x1,y1,x2,y2] giving the element's top-left and \
bottom-right corners in screenshot pixels.
- Write the marker only once, as the very last thing in your answer.
- If the element is not visible or no screenshot was provided, do not write a marker."
    );
    push_dimensions(&mut prompt, screenshot);
    prompt
}

/// System prompt for the single-JSON answer.
pub fn json_system_prompt(product: &str, screenshot: Option<&Screenshot>) -> String {
    let mut prompt = format!(
        "\
You are an assistant helping users with {product}, with the ability to help them locate UI \
elements, understand features, or answer questions.
When identifying UI elements in the screenshot, respond ONLY in JSON format, such as:
{{\"bbox\": [x1, y1, x2, y2], \"text\": \"explanation\"}}
If no element applies, respond with {{\"text\": \"explanation\"}}."
    );
    push_dimensions(&mut prompt, screenshot);
    prompt
}

fn push_dimensions(prompt: &mut String, screenshot: Option<&Screenshot>) {
    if let Some(meta) = screenshot.and_then(|s| s.meta) {
        prompt.push_str(&format!(
            "\n\nThe screenshot is {w}x{h} pixels. Coordinates must satisfy \
0 <= x1 < x2 <= {w} and 0 <= y1 < y2 <= {h}.",
            w = meta.width,
            h = meta.height
        ));
    }
}

pub fn build_messages(
    system: String,
    product: &str,
    query: &str,
    screenshot: Option<&Screenshot>,
) -> Vec<ChatMessage> {
    let mut parts = vec![ContentPart::Text {
        text: format!("User's question about {product}: {query}"),
    }];
    if let Some(shot) = screenshot {
        parts.push(ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: shot.data_url(),
            },
        });
    }
    vec![ChatMessage::system(system), ChatMessage::user(parts)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::MessageContent;
    use crate::perception::types::ScreenshotMeta;

    fn shot(meta: Option<ScreenshotMeta>) -> Screenshot {
        Screenshot {
            image_base64: "AAAA".into(),
            format: None,
            meta,
        }
    }

    #[test]
    fn dimensions_only_when_known() {
        let hd = shot(Some(ScreenshotMeta {
            width: 1920,
            height: 1080,
        }));
        let prompt = streaming_system_prompt("FL Studio", Some(&hd));
        assert!(prompt.contains("[BBOX:x1,y1,x2,y2]"));
        assert!(prompt.contains("1920x1080 pixels"));

        let unknown = shot(None);
        let prompt = streaming_system_prompt("FL Studio", Some(&unknown));
        assert!(!prompt.contains("The screenshot is"));
        assert!(!json_system_prompt("FL Studio", None).contains("The screenshot is"));
    }

    #[test]
    fn user_message_carries_image_part() {
        let hd = shot(None);
        let messages = build_messages("sys".into(), "FL Studio", "Where is the mixer?", Some(&hd));
        assert_eq!(messages.len(), 2);
        let MessageContent::Parts(parts) = &messages[1].content else {
            panic!("user content should be parts");
        };
        assert_eq!(parts.len(), 2);
        let json = serde_json::to_value(&messages[1]).unwrap();
        assert_eq!(
            json["content"][0]["text"],
            "User's question about FL Studio: Where is the mixer?"
        );
        assert_eq!(json["content"][1]["type"], "image_url");
        assert_eq!(json["content"][1]["image_url"]["url"], "data:image/png;base64,AAAA");
    }

    #[test]
    fn text_only_question() {
        let messages = build_messages("sys".into(), "FL Studio", "What is a pattern?", None);
        let json = serde_json::to_value(&messages).unwrap();
        assert_eq!(json[0]["role"], "system");
        assert_eq!(json[0]["content"], "sys");
        assert_eq!(json[1]["content"].as_array().unwrap().len(), 1);
    }
}
