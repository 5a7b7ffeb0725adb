use regex::Regex;
use std::sync::LazyLock;

// A fence marker with any line break directly before it. A language tag is
// only consumed when the rest of the line is empty, so a closing fence glued
// to the prompt keeps the prompt intact.
static FENCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\r?\n?```(?:[A-Za-z0-9_+.-]*[ \t]*\r?\n)?").ok());

/// Strip Markdown code fences and leading line breaks from a model reply.
///
/// Trailing whitespace is kept: replies end with a prompt like `"$ "`.
#[must_use]
pub fn clean_response(raw: &str) -> String {
    let unfenced = FENCE
        .as_ref()
        .map_or_else(|| raw.replace("```", ""), |re| re.replace_all(raw, "").into_owned());

    unfenced.trim_start_matches(['\r', '\n']).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_block_with_language_is_unwrapped() {
        assert_eq!(clean_response("```bash\nout\n```"), "out");
    }

    #[test]
    fn bare_fence_with_crlf_is_unwrapped() {
        assert_eq!(
            clean_response("```\r\nfile.txt\r\nroot@h:~$ \r\n```"),
            "file.txt\r\nroot@h:~$ "
        );
    }

    #[test]
    fn closing_fence_glued_to_prompt_keeps_prompt() {
        assert_eq!(
            clean_response("```\nout\n```root@h:~$ "),
            "outroot@h:~$ "
        );
    }

    #[test]
    fn leading_newlines_are_stripped_trailing_space_kept() {
        assert_eq!(clean_response("\r\n\nuid=0(root)\r\nroot@h:~$ "), "uid=0(root)\r\nroot@h:~$ ");
    }

    #[test]
    fn plain_reply_is_untouched() {
        let reply = "Desktop  Music\r\nroot@h:~$ ";
        assert_eq!(clean_response(reply), reply);
    }
}
