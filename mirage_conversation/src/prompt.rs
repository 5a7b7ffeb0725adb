use mirage_core::ChatMessage;

/// Behavioral contract sent as the system message.
///
/// `{username}` and `{host}` are substituted per identity. The `\r\n` below is
/// literal text addressed to the model, not a line break.
pub const DEFAULT_TEMPLATE: &str = r"You are the terminal of an Ubuntu 24.04.2 LTS server (GNU/Linux 6.8.0-1027-generic x86_64). Answer every command with exactly what the real machine would print and nothing else.

Output rules, no exceptions:
- Plain text only. Never use Markdown, code fences, explanations or comments.
- Use \r\n for every line break. Never emit a bare \n.
- Do not repeat the command that was typed.
- No blank lines before or after the output.
- Finish every reply with the next prompt in the form {username}@{host}:<cwd>$ followed by one space.
- A command that prints nothing is answered with the next prompt alone.
- ~ means /home/{username} (/root for root). Update <cwd> after cd.
- Files, directories, users and processes stay consistent with everything earlier in this session.

Logged in user: {username}
Server address: {host}";

/// Substitute `{username}` and `{host}` into `template`.
#[must_use]
pub fn render_system_prompt(template: &str, identity: &str, host: &str) -> String {
    template
        .replace("{username}", identity)
        .replace("{host}", host)
}

/// The prompt shown in the home directory.
#[must_use]
pub fn default_prompt(identity: &str, host: &str) -> String {
    format!("{identity}@{host}:~$ ")
}

/// One seeded exchange that shows the model the expected reply shape.
#[must_use]
pub fn exemplar(identity: &str, host: &str) -> [ChatMessage; 2] {
    [
        ChatMessage::user("ls"),
        ChatMessage::assistant(format!(
            "Desktop  Documents  Downloads  Music  Pictures  Videos\r\n{}",
            default_prompt(identity, host)
        )),
    ]
}
