/// Instruction sent ahead of every problem description.
pub const DEFAULT_INSTRUCTION: &str = "Give two different solutions in python to the following \
     coding question. add ``` to start and end of each solution";

/// Prompt for one generation call: `"{instruction}: {description}"`.
pub fn build_prompt(instruction: &str, description: &str) -> String {
    let instruction = instruction.trim();
    let instruction = if instruction.is_empty() {
        DEFAULT_INSTRUCTION
    } else {
        instruction
    };

    format!("{instruction}: {description}")
}
