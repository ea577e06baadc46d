use ammonia;

/// Clean HTML content using the ammonia library.
///
/// Exam and question descriptions are rich text authored in the admin
/// interface; this whitelist-based sanitization keeps safe tags (like <b>,
/// <p>) while stripping dangerous ones (like <script>) and malicious
/// attributes (like onclick) before they are stored.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
