//! Keystroke state machine.
//!
//! Only arrow keys are expected after ESC, so an escape sequence is taken to
//! be ESC plus exactly two bytes. Longer sequences (function keys, bracketed
//! paste) leak their tail into the buffer.

const CR: u8 = b'\r';
const ESC: u8 = 0x1b;
const DEL: u8 = 0x7f;

/// Bytes sent to move the cursor back over one erased character.
pub const ERASE: &[u8] = b"\x08 \x08";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorState {
    AwaitingInput,
    Accumulating,
    /// Swallowing the tail of an escape sequence.
    EscapeSeq { remaining: u8 },
}

/// What the caller should do with one fed byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Echo this byte back verbatim.
    Echo(u8),
    /// Write [`ERASE`].
    Erase,
    /// A full line was entered.
    Submit(String),
    /// Nothing visible happens.
    Ignore,
}

#[derive(Debug)]
pub struct LineEditor {
    state: EditorState,
    buffer: Vec<u8>,
}

impl Default for LineEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl LineEditor {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: EditorState::AwaitingInput,
            buffer: Vec::new(),
        }
    }

    #[must_use]
    pub const fn state(&self) -> EditorState {
        self.state
    }

    /// The bytes typed so far on the current line.
    #[must_use]
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    pub fn feed(&mut self, byte: u8) -> KeyOutcome {
        if let EditorState::EscapeSeq { remaining } = self.state {
            self.state = if remaining > 1 {
                EditorState::EscapeSeq {
                    remaining: remaining - 1,
                }
            } else {
                EditorState::Accumulating
            };
            return KeyOutcome::Ignore;
        }

        match byte {
            CR => {
                let line = String::from_utf8_lossy(&self.buffer).into_owned();
                self.buffer.clear();
                self.state = EditorState::AwaitingInput;
                KeyOutcome::Submit(line)
            }
            ESC => {
                self.state = EditorState::EscapeSeq { remaining: 2 };
                KeyOutcome::Ignore
            }
            DEL => {
                if self.pop_char() {
                    KeyOutcome::Erase
                } else {
                    KeyOutcome::Ignore
                }
            }
            b if b < 0x20 => KeyOutcome::Ignore,
            b => {
                self.buffer.push(b);
                self.state = EditorState::Accumulating;
                KeyOutcome::Echo(b)
            }
        }
    }

    /// Drop the last UTF-8 character, continuation bytes included.
    fn pop_char(&mut self) -> bool {
        let before = self.buffer.len();
        while let Some(byte) = self.buffer.pop() {
            if byte & 0xc0 != 0x80 {
                break;
            }
        }
        self.buffer.len() < before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(editor: &mut LineEditor, bytes: &[u8]) -> Vec<KeyOutcome> {
        bytes.iter().map(|b| editor.feed(*b)).collect()
    }

    fn submitted(outcomes: &[KeyOutcome]) -> Vec<String> {
        outcomes
            .iter()
            .filter_map(|o| match o {
                KeyOutcome::Submit(line) => Some(line.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_printable_bytes_echo_and_accumulate() {
        let mut editor = LineEditor::new();
        assert_eq!(editor.state(), EditorState::AwaitingInput);

        let outcomes = feed_all(&mut editor, b"ls");

        assert_eq!(outcomes, [KeyOutcome::Echo(b'l'), KeyOutcome::Echo(b's')]);
        assert_eq!(editor.state(), EditorState::Accumulating);
        assert_eq!(editor.pending(), b"ls");
    }

    #[test]
    fn test_carriage_return_submits_and_resets() {
        let mut editor = LineEditor::new();
        let outcomes = feed_all(&mut editor, b"uname -a\r");

        assert_eq!(submitted(&outcomes), ["uname -a"]);
        assert_eq!(editor.state(), EditorState::AwaitingInput);
        assert!(editor.pending().is_empty());
    }

    #[test]
    fn test_delete_edits_left_to_right() {
        let mut editor = LineEditor::new();
        let outcomes = feed_all(&mut editor, b"lx\x7fs -la\x7f\x7fl\r");

        assert_eq!(submitted(&outcomes), ["ls -l"]);
        assert_eq!(outcomes[2], KeyOutcome::Erase);
    }

    #[test]
    fn test_delete_on_empty_line_is_silent() {
        let mut editor = LineEditor::new();
        assert_eq!(editor.feed(DEL), KeyOutcome::Ignore);
        assert_eq!(editor.state(), EditorState::AwaitingInput);
    }

    #[test]
    fn test_delete_removes_whole_utf8_character() {
        let mut editor = LineEditor::new();
        let outcomes = feed_all(&mut editor, "cd é".as_bytes());
        assert_eq!(outcomes.len(), 5);

        assert_eq!(editor.feed(DEL), KeyOutcome::Erase);
        assert_eq!(editor.pending(), b"cd ");
    }

    #[test]
    fn test_arrow_keys_are_elided() {
        let mut editor = LineEditor::new();
        let outcomes = feed_all(&mut editor, b"ps\x1b[A\x1b[D aux\r");

        assert_eq!(submitted(&outcomes), ["ps aux"]);
        assert!(
            outcomes[2..8].iter().all(|o| *o == KeyOutcome::Ignore),
            "escape bytes must not echo"
        );
    }

    #[test]
    fn test_any_two_bytes_after_escape_are_elided() {
        let mut editor = LineEditor::new();
        editor.feed(ESC);
        assert_eq!(editor.state(), EditorState::EscapeSeq { remaining: 2 });
        assert_eq!(editor.feed(b'\r'), KeyOutcome::Ignore);
        assert_eq!(editor.feed(b'x'), KeyOutcome::Ignore);
        assert_eq!(editor.state(), EditorState::Accumulating);
        assert!(editor.pending().is_empty());
    }

    #[test]
    fn test_other_control_bytes_are_filtered() {
        let mut editor = LineEditor::new();
        let outcomes = feed_all(&mut editor, b"i\x03d\x08\n\t\r");

        assert_eq!(submitted(&outcomes), ["id"]);
        assert_eq!(
            outcomes.iter().filter(|o| matches!(o, KeyOutcome::Echo(_))).count(),
            2
        );
    }

    #[test]
    fn test_empty_line_submits_empty_command() {
        let mut editor = LineEditor::new();
        assert_eq!(editor.feed(CR), KeyOutcome::Submit(String::new()));
    }
}
