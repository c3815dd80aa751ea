use regex::Regex;

/// Filesystem-safe version of a person name, for the organized per-person
/// folders. Anything outside word characters, spaces and dashes is dropped.
pub fn sanitize_folder_name(name: &str) -> String {
    let re = Regex::new(r"[^\w\d\s_-]+").unwrap();
    re.replace_all(name, "").trim().to_string()
}
