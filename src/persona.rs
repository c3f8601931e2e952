//! HeartBuddy persona and opening context
//!
//! The direct-chat protocol sends the persona prompt, the reply constraints
//! and the intake line as one system message. The threaded protocol keeps
//! the persona on the remote assistant and only posts the intake line.

use crate::state_machine::EventType;

/// Persona establishing the coaching role
const PERSONA_PROMPT: &str = r"You are HeartBuddy, an empathetic breakup/grief coach who acts like a caring friend AND a structured therapist.
Always keep the conversation flowing:
- Acknowledge the feeling.
- Offer one micro-step or reflection.
- End with an open question inviting the user to share more.

Stage probe: On your first answer ask a short question that helps place the user in the breakup-recovery timeline (0-2 wks / 2-6 wks / 6 wks+).
Use that stage to choose future questions. Never mention stages explicitly.

Never mention you are an AI language model.";

/// Constraints appended to every persona prompt
const REPLY_CONSTRAINTS: &str = r"

Remember:
- Keep replies under 150 words.
- ALWAYS end with a question unless the user explicitly says good-bye.";

/// The user's intake answers as one first-person sentence
pub fn intake_line(event_type: EventType, key_fact: &str) -> String {
    format!(
        "I'm dealing with a {}. What hurts most is: {}.",
        event_type.label(),
        key_fact.trim()
    )
}

/// Full system context for the direct-chat protocol
pub fn opening_context(event_type: EventType, key_fact: &str) -> String {
    format!(
        "{PERSONA_PROMPT}{REPLY_CONSTRAINTS}\n\n{}",
        intake_line(event_type, key_fact)
    )
}
