use crate::llm::ChatMessage;

const CONTEXT_SEPARATOR: &str = "\n\n----------\n\n";

/// Agent fields after input substitution.
#[derive(Debug, Clone)]
pub struct AgentPersona {
    pub role: String,
    pub goal: String,
    pub backstory: String,
}

pub fn system_prompt(persona: &AgentPersona) -> String {
    format!(
        "You are {}.\n{}\n\nYour personal goal is: {}",
        persona.role,
        persona.backstory.trim(),
        persona.goal.trim()
    )
}

pub fn task_prompt(description: &str, expected_output: &str, context: &[&str]) -> String {
    let mut out = String::new();
    out.push_str("Current Task: ");
    out.push_str(description.trim());
    out.push_str("\n\nThis is the expected criteria for your final answer: ");
    out.push_str(expected_output.trim());
    out.push_str(
        "\nyou MUST return the actual complete content as the final answer, not a summary.",
    );

    if !context.is_empty() {
        out.push_str("\n\nThis is the context you're working with:\n");
        out.push_str(&context.join(CONTEXT_SEPARATOR));
    }

    out.push_str("\n\nBegin! Give your best final answer.");
    out
}

pub fn build_messages(
    persona: &AgentPersona,
    description: &str,
    expected_output: &str,
    context: &[&str],
) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system_prompt(persona)),
        ChatMessage::user(task_prompt(description, expected_output, context)),
    ]
}
