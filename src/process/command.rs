use heapless::Vec;

use crate::config::{COMMAND_ARGS_LEN, COMMAND_NAME_LEN};
use crate::error::{KernelError, KernelResult};

/// A command line split into program name and argument tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: Vec<u8, COMMAND_NAME_LEN>,
    args: Vec<u8, COMMAND_ARGS_LEN>,
}

impl Command {
    /// Split `line` at its first run of spaces.
    ///
    /// The line ends at the first newline or NUL. Leading spaces are skipped,
    /// the name is the first run of non-space bytes and the arguments are the
    /// rest with surrounding spaces trimmed. Both are truncated to their
    /// buffers.
    pub fn parse(line: &[u8]) -> KernelResult<Command> {
        let end = line
            .iter()
            .position(|&b| b == b'\n' || b == 0)
            .unwrap_or(line.len());
        let line = trim_spaces(&line[..end]);
        let name_len = line.iter().position(|&b| b == b' ').unwrap_or(line.len());
        if name_len == 0 {
            return Err(KernelError::InvalidCommand);
        }
        let (name, rest) = line.split_at(name_len);
        Ok(Command { name: truncated(name), args: truncated(trim_spaces(rest)) })
    }

    pub fn name(&self) -> &[u8] {
        &self.name
    }

    pub fn args(&self) -> &[u8] {
        &self.args
    }
}

fn trim_spaces(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != b' ').unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|&b| b != b' ').map_or(start, |i| i + 1);
    &bytes[start..end.max(start)]
}

fn truncated<const N: usize>(bytes: &[u8]) -> Vec<u8, N> {
    let mut out = Vec::new();
    for &b in bytes.iter().take(N) {
        let _ = out.push(b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_and_tail() {
        let cmd = Command::parse(b"grep foo").unwrap();
        assert_eq!(cmd.name(), b"grep");
        assert_eq!(cmd.args(), b"foo");
    }

    #[test]
    fn spaces_and_terminators_are_trimmed() {
        let cmd = Command::parse(b"   cat   frame0.txt  \n ignored").unwrap();
        assert_eq!(cmd.name(), b"cat");
        assert_eq!(cmd.args(), b"frame0.txt");

        let cmd = Command::parse(b"ls\0junk").unwrap();
        assert_eq!(cmd.name(), b"ls");
        assert!(cmd.args().is_empty());
    }

    #[test]
    fn inner_spaces_stay_in_the_arguments() {
        let cmd = Command::parse(b"grep  a  b").unwrap();
        assert_eq!(cmd.args(), b"a  b");
    }

    #[test]
    fn blank_lines_are_rejected() {
        assert_eq!(Command::parse(b""), Err(KernelError::InvalidCommand));
        assert_eq!(Command::parse(b"    \n"), Err(KernelError::InvalidCommand));
    }

    #[test]
    fn long_parts_are_truncated() {
        let mut line = [b'n'; 40].to_vec();
        line.push(b' ');
        line.extend_from_slice(&[b'a'; 200]);
        let cmd = Command::parse(&line).unwrap();
        assert_eq!(cmd.name().len(), COMMAND_NAME_LEN);
        assert_eq!(cmd.args().len(), COMMAND_ARGS_LEN);
    }
}
