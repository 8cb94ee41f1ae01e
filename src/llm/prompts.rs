use std::collections::HashMap;

const DEFAULT_OBSERVE_INSTRUCTION: &str = "Find elements that can be used for any future actions in the page. These may be navigation links, related pages, section/subsection links, buttons, or other interactive elements. Be comprehensive: if there are multiple elements that may be relevant for future actions, return all of them.";

const DEFAULT_EXTRACT_INSTRUCTION: &str = "Extract all of the data on the page that matches the requested schema.";

pub const SUPPORTED_ACTIONS: &[&str] = &[
    "click",
    "scrollIntoView",
    "scrollTo",
    "nextChunk",
    "prevChunk",
    "fill",
    "type",
    "press",
    "selectOptionFromDropdown",
];

pub fn build_observe_system_prompt() -> String {
    format!(
        "You are helping the user automate the browser by finding elements based on what the user wants to observe in the page.\n\nYou will be given:\n1. an instruction of elements to observe\n2. a numbered list of the interactive elements on the page, one per line, in the form `[id] role <tag>: text`.\n\nReturn an array of elements that match the instruction if they exist, otherwise return an empty array. Whenever suggesting actions, use one of the following supported actions:\n{}\n\nRespond with JSON: always return a JSON object with an `elements` array describing the matches. Each element must be an object with keys `element_id` (the numeric id from the list), `description` (a short natural language summary), `method` (one of the supported actions), and `arguments` (an array of strings for the action arguments).",
        SUPPORTED_ACTIONS.join(", ")
    )
}

pub fn build_observe_user_message(instruction: &str, elements: &str) -> String {
    format!("instruction: {instruction}\nElements:\n{elements}")
}

pub fn build_extract_system_prompt(structured: bool) -> String {
    let reply_shape = if structured {
        "Respond with JSON: your entire reply must be valid JSON that matches the requested schema."
    } else {
        "Respond with JSON: return an object with a single string key `extraction` holding the extracted content."
    };

    [
        "You are extracting content on behalf of a user.\nIf a user asks you to extract a 'list' of information, or 'all' information,\nYOU MUST EXTRACT ALL OF THE INFORMATION THAT THE USER REQUESTS.\n\nYou will be given:\n1. An instruction\n2. A text representation of a webpage to extract information from.",
        "Print the exact text from the text-rendered webpage with all symbols, characters, and endlines as is.\nPrint null or an empty string if no new information is found.",
        reply_shape,
        "Once you are given the text-rendered webpage, you must thoroughly and meticulously analyze it. Be very careful to ensure that you do not miss any important information.",
    ]
    .join("\n\n")
}

pub fn build_extract_user_prompt(instruction: &str, page_text: &str) -> String {
    format!("Instruction: {instruction}\nWebpage text:\n{page_text}")
}

pub fn build_act_observe_prompt(action: &str, variables: Option<&HashMap<String, String>>) -> String {
    let mut prompt = format!(
        "Find the most relevant element to perform an action on given the following action: {action}.\nProvide an action for this element such as {}. Remember that to users, buttons and links look the same in most cases.\nIf the action is completely unrelated to a potential action to be taken on the page, return an empty array.\nONLY return one action. If multiple actions are relevant, return the most relevant one.",
        SUPPORTED_ACTIONS.join(", ")
    );

    if let Some(vars) = variables.filter(|vars| !vars.is_empty()) {
        let mut names: Vec<&String> = vars.keys().collect();
        names.sort();
        prompt.push_str(
            "\nIf the action needs a value, use the matching variable placeholder as the argument instead of the value itself.\n\nAvailable variables:",
        );
        for name in names {
            prompt.push_str(&format!("\n- %{name}%"));
        }
    }

    prompt
}

pub fn effective_observe_instruction(user_instruction: Option<&str>) -> &str {
    match user_instruction {
        Some(value) if !value.trim().is_empty() => value,
        _ => DEFAULT_OBSERVE_INSTRUCTION,
    }
}

/// Instruction used when only a schema is given.
pub fn effective_extract_instruction(user_instruction: Option<&str>) -> &str {
    match user_instruction {
        Some(value) if !value.trim().is_empty() => value,
        _ => DEFAULT_EXTRACT_INSTRUCTION,
    }
}
