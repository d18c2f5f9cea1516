//! Call-control markup returned to the carrier from webhooks.
//!
//! Only the handful of verbs the conversation loop needs are modelled. Text
//! and attribute values are XML-escaped on render.

use std::fmt;

/// Speech-input collection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gather {
    /// URL the carrier posts the recognized speech to.
    pub action: String,
    /// Seconds to wait for the caller to start speaking.
    pub timeout_secs: u32,
    /// End-of-speech detection; `auto` lets the carrier decide.
    pub speech_timeout: String,
}

impl Gather {
    pub fn new(action: impl Into<String>, timeout_secs: u32) -> Self {
        Self {
            action: action.into(),
            timeout_secs,
            speech_timeout: "auto".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verb {
    Say(String),
    Play(String),
    Gather(Gather),
    Hangup,
}

/// An ordered list of verbs rendered as a `<Response>` document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoiceResponse {
    verbs: Vec<Verb>,
}

impl VoiceResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn say(mut self, text: impl Into<String>) -> Self {
        self.verbs.push(Verb::Say(text.into()));
        self
    }

    pub fn play(mut self, url: impl Into<String>) -> Self {
        self.verbs.push(Verb::Play(url.into()));
        self
    }

    pub fn gather(mut self, gather: Gather) -> Self {
        self.verbs.push(Verb::Gather(gather));
        self
    }

    pub fn hangup(mut self) -> Self {
        self.verbs.push(Verb::Hangup);
        self
    }

    pub fn verbs(&self) -> &[Verb] {
        &self.verbs
    }

    /// True when the call ends after this response.
    pub fn is_terminal(&self) -> bool {
        matches!(self.verbs.last(), Some(Verb::Hangup))
    }

    /// True when this response listens for more caller speech.
    pub fn gathers(&self) -> bool {
        self.verbs.iter().any(|v| matches!(v, Verb::Gather(_)))
    }

    pub fn render(&self) -> String {
        let mut out = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><Response>"#);
        for verb in &self.verbs {
            match verb {
                Verb::Say(text) => {
                    out.push_str("<Say>");
                    out.push_str(&escape(text));
                    out.push_str("</Say>");
                }
                Verb::Play(url) => {
                    out.push_str("<Play>");
                    out.push_str(&escape(url));
                    out.push_str("</Play>");
                }
                Verb::Gather(g) => {
                    out.push_str(&format!(
                        r#"<Gather input="speech" action="{}" timeout="{}" speechTimeout="{}"></Gather>"#,
                        escape(&g.action),
                        g.timeout_secs,
                        escape(&g.speech_timeout)
                    ));
                }
                Verb::Hangup => out.push_str("<Hangup/>"),
            }
        }
        out.push_str("</Response>");
        out
    }
}

impl fmt::Display for VoiceResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Escapes the five XML special characters.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
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
