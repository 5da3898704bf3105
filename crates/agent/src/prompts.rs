//! System instruction for the canvas assistant.

/// Placed first in every session. Never persisted.
pub const SYSTEM_PROMPT: &str = "You are a canvas assistant for image projects.
If images are provided, treat them as visual references.
Do not claim to see things unless they are visibly present in the provided images.
Respond helpfully and concisely.

If the user asks to generate or edit images/videos:
1) Decide route in {\"t2i\",\"i2i\",\"m2i\",\"i2v\"} and a short intent string.
2) Call generate(route,intent) first.
3) Only after the tool returns, explain what will happen / what you did.
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_names_every_route_and_the_tool() {
        for route in faceagent_core::Route::ALL {
            assert!(SYSTEM_PROMPT.contains(&format!("\"{route}\"")));
        }
        assert!(SYSTEM_PROMPT.contains("generate(route,intent)"));
    }
}
