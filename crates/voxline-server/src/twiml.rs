//! TwiML documents returned to the telephony provider.
//!
//! Every caller-facing prompt carries a `<Gather>` that posts the recognized
//! speech back to `/process-speech`, so the conversation loops until the
//! caller hangs up or stays silent.

/// Route the provider posts gathered speech to.
pub const PROCESS_SPEECH_PATH: &str = "/process-speech";

/// Spoken when a call is first answered.
pub const GREETING: &str = "Hello! I'm your AI assistant. How can I help you today?";

/// Spoken when the caller said nothing recognizable.
pub const REPROMPT: &str = "I didn't catch that. Could you please repeat?";

/// Spoken when the model could not produce a reply.
pub const APOLOGY: &str = "Sorry, I'm having trouble right now. Please try again.";

const SPEAK_NOW: &str = "Please speak now.";
const FOLLOW_UP: &str = "Is there anything else I can help you with?";
const NO_INPUT: &str = "I didn't hear anything. Goodbye!";
const FAREWELL: &str = "Thank you for calling. Goodbye!";

/// Greeting followed by a speech gather.
pub fn greeting(voice: &str) -> String {
    document(&[
        say(voice, GREETING),
        gather(voice, SPEAK_NOW),
        say(voice, NO_INPUT),
    ])
}

/// Speaks `reply` then gathers the caller's next turn.
pub fn reply(voice: &str, reply: &str) -> String {
    document(&[
        say(voice, reply),
        gather(voice, FOLLOW_UP),
        say(voice, FAREWELL),
    ])
}

/// Asks the caller to repeat themselves.
pub fn reprompt(voice: &str) -> String {
    document(&[
        say(voice, REPROMPT),
        gather(voice, SPEAK_NOW),
        say(voice, FAREWELL),
    ])
}

fn document(verbs: &[String]) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response>\n");
    for verb in verbs {
        out.push_str(verb);
    }
    out.push_str("</Response>\n");
    out
}

fn say(voice: &str, text: &str) -> String {
    format!(
        "  <Say voice=\"{}\">{}</Say>\n",
        escape_xml(voice),
        escape_xml(text)
    )
}

fn gather(voice: &str, prompt: &str) -> String {
    format!(
        "  <Gather input=\"speech\" action=\"{}\" method=\"POST\" speechTimeout=\"5\" timeout=\"10\">\n  {}  </Gather>\n",
        PROCESS_SPEECH_PATH,
        say(voice, prompt)
    )
}

/// Escapes text for use in XML element content and attribute values.
pub fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
