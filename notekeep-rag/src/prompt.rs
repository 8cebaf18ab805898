//! Raw prompt serializers for local chat models.
//!
//! Each model family wraps turns in its own control tokens. A rendered
//! prompt always ends with an open assistant header so the model continues
//! as the assistant.

use notekeep_core::{ModelFamily, PromptTurn, TurnRole};

pub trait PromptFormat: Send + Sync {
    fn family(&self) -> ModelFamily;

    fn render(&self, turns: &[PromptTurn]) -> String;

    /// Markers the backend should stop generating at.
    fn stop_sequences(&self) -> &'static [&'static str];
}

pub fn format_for(family: ModelFamily) -> Box<dyn PromptFormat> {
    match family {
        ModelFamily::ChatMl => Box::new(ChatMl),
        ModelFamily::Llama3 => Box::new(Llama3),
        ModelFamily::Gemma => Box::new(Gemma),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChatMl;

impl PromptFormat for ChatMl {
    fn family(&self) -> ModelFamily {
        ModelFamily::ChatMl
    }

    fn render(&self, turns: &[PromptTurn]) -> String {
        let mut out = String::new();
        for turn in turns {
            out.push_str("<|im_start|>");
            out.push_str(turn.role().as_str());
            out.push('\n');
            out.push_str(&turn.rendered_body());
            out.push_str("<|im_end|>\n");
        }
        out.push_str("<|im_start|>assistant\n");
        out
    }

    fn stop_sequences(&self) -> &'static [&'static str] {
        &["<|im_end|>"]
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Llama3;

impl PromptFormat for Llama3 {
    fn family(&self) -> ModelFamily {
        ModelFamily::Llama3
    }

    fn render(&self, turns: &[PromptTurn]) -> String {
        let mut out = String::from("<|begin_of_text|>");
        for turn in turns {
            push_llama_header(&mut out, turn.role());
            out.push_str(&turn.rendered_body());
            out.push_str("<|eot_id|>");
        }
        push_llama_header(&mut out, TurnRole::Assistant);
        out
    }

    fn stop_sequences(&self) -> &'static [&'static str] {
        &["<|eot_id|>", "<|end_of_text|>"]
    }
}

fn push_llama_header(out: &mut String, role: TurnRole) {
    out.push_str("<|start_header_id|>");
    out.push_str(role.as_str());
    out.push_str("<|end_header_id|>\n\n");
}

/// Gemma has no system role; system text is folded into the first user turn.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gemma;

impl PromptFormat for Gemma {
    fn family(&self) -> ModelFamily {
        ModelFamily::Gemma
    }

    fn render(&self, turns: &[PromptTurn]) -> String {
        let mut out = String::from("<bos>");
        let mut pending_system: Vec<&str> = Vec::new();

        for turn in turns {
            let role = match turn {
                PromptTurn::System { text } => {
                    pending_system.push(text);
                    continue;
                }
                PromptTurn::User { .. } => "user",
                PromptTurn::Assistant { .. } => "model",
            };

            out.push_str("<start_of_turn>");
            out.push_str(role);
            out.push('\n');
            if role == "user" && !pending_system.is_empty() {
                out.push_str(&pending_system.join("\n\n"));
                out.push_str("\n\n");
                pending_system.clear();
            }
            out.push_str(&turn.rendered_body());
            out.push_str("<end_of_turn>\n");
        }

        // System text with no user turn after it still reaches the model.
        if !pending_system.is_empty() {
            out.push_str("<start_of_turn>user\n");
            out.push_str(&pending_system.join("\n\n"));
            out.push_str("<end_of_turn>\n");
        }

        out.push_str("<start_of_turn>model\n");
        out
    }

    fn stop_sequences(&self) -> &'static [&'static str] {
        &["<end_of_turn>"]
    }
}
