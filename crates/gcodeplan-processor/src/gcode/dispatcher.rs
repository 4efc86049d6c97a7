//! Mnemonic trie
//!
//! Maps command words to handlers one character at a time. A node marked
//! `early_quit` fires as soon as it is reached, which lets `T` match `T0`,
//! `T12` and so on without registering every tool number.

use gcodeplan_core::GcodeError;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct TrieNode<H> {
    children: BTreeMap<char, TrieNode<H>>,
    handler: Option<H>,
    early_quit: bool,
}

impl<H> Default for TrieNode<H> {
    fn default() -> Self {
        Self {
            children: BTreeMap::new(),
            handler: None,
            early_quit: false,
        }
    }
}

/// Character trie from mnemonic to handler
#[derive(Debug, Clone)]
pub struct CommandTrie<H> {
    root: TrieNode<H>,
}

impl<H> Default for CommandTrie<H> {
    fn default() -> Self {
        Self {
            root: TrieNode::default(),
        }
    }
}

impl<H: Copy> CommandTrie<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `handler` at the end of the path spelled by `mnemonic`
    ///
    /// Registering the same mnemonic twice is an error.
    pub fn register(&mut self, mnemonic: &str, handler: H, early_quit: bool) -> Result<(), GcodeError> {
        let mut node = &mut self.root;
        for c in mnemonic.chars() {
            node = node.children.entry(c).or_default();
        }
        if node.handler.is_some() {
            return Err(GcodeError::DuplicateMnemonic {
                mnemonic: mnemonic.to_string(),
            });
        }
        node.handler = Some(handler);
        node.early_quit = early_quit;
        Ok(())
    }

    /// Walk `token` through the trie
    ///
    /// Returns the handler of an early-quit node met on the way, or the
    /// handler at the end of the token.
    pub fn lookup(&self, token: &str) -> Option<H> {
        let mut node = &self.root;
        for c in token.chars() {
            if node.early_quit {
                if let Some(handler) = node.handler {
                    return Some(handler);
                }
            }
            node = node.children.get(&c)?;
        }
        node.handler
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        let mut trie = CommandTrie::new();
        trie.register("G1", 1, false).unwrap();
        trie.register("G10", 10, false).unwrap();
        assert_eq!(trie.lookup("G1"), Some(1));
        assert_eq!(trie.lookup("G10"), Some(10));
        assert_eq!(trie.lookup("G"), None);
        assert_eq!(trie.lookup("G100"), None);
    }

    #[test]
    fn test_early_quit_matches_suffix() {
        let mut trie = CommandTrie::new();
        trie.register("T", 't', true).unwrap();
        assert_eq!(trie.lookup("T12"), Some('t'));
        assert_eq!(trie.lookup("T"), Some('t'));
        assert_eq!(trie.lookup("X1"), None);
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut trie = CommandTrie::new();
        trie.register("M104", 0, false).unwrap();
        let err = trie.register("M104", 1, false).unwrap_err();
        assert_eq!(
            err,
            GcodeError::DuplicateMnemonic {
                mnemonic: "M104".to_string()
            }
        );
    }
}
