//! Generated commit messages for submodule updates.

/// Git's conventional subject-line budget.
const SHORT_FORM_LIMIT: usize = 50;

/// Body wrap column for the long form.
const WRAP_COLUMN: usize = 72;

/// Build the commit message for a set of updated submodules.
///
/// The short form `Update a, b, c from <branch>` is used when it fits the
/// subject-line budget; otherwise the subject counts the submodules and the
/// full list moves into a wrapped body.
pub fn update_message(names: &[String], branch: &str) -> String {
    let mut sorted = names.to_vec();
    sorted.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()));

    let update = format!("Update {}", sorted.join(", "));
    let message = format!("{update} from {branch}");
    if message.len() <= SHORT_FORM_LIMIT {
        return message;
    }

    let noun = if sorted.len() == 1 {
        "submodule"
    } else {
        "submodules"
    };
    let mut long = format!("Update {} {noun} from {branch}\n\n", sorted.len());
    long.push_str(&wrap(&format!("{update}."), WRAP_COLUMN));
    long.push('\n');
    long
}

/// Trim the leading group directory from a declared submodule name:
/// `libs/algorithm` becomes `algorithm`.
pub fn short_name(declared_name: &str) -> &str {
    declared_name
        .split_once('/')
        .map(|(_, rest)| rest)
        .unwrap_or(declared_name)
}

/// Greedy word wrap. Words longer than the width get their own line.
fn wrap(text: &str, width: usize) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut line = String::new();

    for word in text.split_whitespace() {
        if line.is_empty() {
            line.push_str(word);
        } else if line.len() + 1 + word.len() <= width {
            line.push(' ');
            line.push_str(word);
        } else {
            lines.push(std::mem::take(&mut line));
            line.push_str(word);
        }
    }

    if !line.is_empty() {
        lines.push(line);
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_short_form() {
        let message = update_message(&names(&["align", "core"]), "develop");
        assert_eq!(message, "Update align, core from develop");
    }

    #[test]
    fn test_short_form_sorts_case_insensitively() {
        let message = update_message(&names(&["Core", "align"]), "develop");
        assert_eq!(message, "Update align, Core from develop");
    }

    #[test]
    fn test_long_form_counts_and_wraps() {
        let many = names(&[
            "algorithm",
            "align",
            "any",
            "array",
            "asio",
            "assert",
            "atomic",
            "beast",
            "bimap",
            "bind",
        ]);
        let message = update_message(&many, "develop");

        let mut lines = message.lines();
        assert_eq!(lines.next(), Some("Update 10 submodules from develop"));
        assert_eq!(lines.next(), Some(""));

        let body: Vec<&str> = lines.collect();
        assert!(!body.is_empty());
        assert!(body.iter().all(|line| line.len() <= WRAP_COLUMN));

        let joined = body.join(" ");
        assert!(joined.starts_with("Update algorithm, align,"));
        assert!(joined.ends_with("bind."));
    }

    #[test]
    fn test_long_form_singular() {
        let long_name = names(&["a-submodule-with-an-extremely-long-name-indeed"]);
        let message = update_message(&long_name, "develop");
        assert!(message.starts_with("Update 1 submodule from develop\n\n"));
    }

    #[test]
    fn test_boundary_length_stays_short() {
        // Exactly at the limit stays in the short form.
        let branch = "develop";
        let name = "x".repeat(SHORT_FORM_LIMIT - "Update  from develop".len());
        let message = update_message(&names(&[&name]), branch);
        assert_eq!(message.len(), SHORT_FORM_LIMIT);
        assert!(!message.contains('\n'));
    }

    #[test]
    fn test_short_name_trims_group_directory() {
        assert_eq!(short_name("libs/algorithm"), "algorithm");
        assert_eq!(short_name("tools/build"), "build");
        assert_eq!(short_name("plain"), "plain");
    }

    #[test]
    fn test_wrap_handles_long_words() {
        let wrapped = wrap("short loooooooooooong", 5);
        assert_eq!(wrapped, "short\nloooooooooooong");
    }
}
