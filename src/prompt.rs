use std::fmt::Write;

use crate::models::{ ContextBundle, Mode };

/// Similar files included in the prompt.
pub const PROMPT_FILE_CAP: usize = 5;
/// Characters of each similar file included in the prompt.
pub const PROMPT_CONTENT_CHARS: usize = 1000;

pub fn build_prompt(request: &str, context: &ContextBundle, mode: Mode) -> String {
    let summary = &context.codebase_summary;
    let mut prompt = format!(
        "You are an AI coding assistant. You have access to the following codebase context:\n\n\
         Project Type: {}\n\
         Directories: {}\n\n",
        summary.project_type,
        summary.directories.join(", ")
    );

    if let Some(current) = &context.current_file {
        let _ = writeln!(prompt, "Current File: {}", current.filepath);
        let _ = writeln!(prompt, "File Type: {}\n", current.filetype);
    }

    if !context.similar_files.is_empty() {
        prompt.push_str("Relevant Code Context:\n");
        for file in context.similar_files.iter().take(PROMPT_FILE_CAP) {
            let _ = writeln!(prompt, "\n--- {} ({}) ---", file.filepath, file.filetype);
            prompt.extend(file.content.chars().take(PROMPT_CONTENT_CHARS));
            prompt.push('\n');
        }
    }

    let _ = write!(prompt, "\n--- User Request ---\n{}\n\n", request);

    prompt.push_str(match mode {
        Mode::Completion => "Provide a concise code completion. Return only the code, no explanations.",
        Mode::Generation =>
            "Provide clean, well-commented code. If creating a new file, include the complete file content.",
    });
    prompt
}
