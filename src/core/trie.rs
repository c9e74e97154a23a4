//! Radix tree for "does this text start with any of these prefixes" checks

use std::fmt;

#[derive(Debug, Clone, Default)]
struct Node {
    segment: Box<[u8]>,
    /// A configured prefix ends here; descendants are never consulted
    terminal: bool,
    /// Sorted by first byte, first bytes are unique
    children: Vec<Node>,
}

impl Node {
    fn leaf(segment: &[u8]) -> Self {
        Self {
            segment: segment.into(),
            terminal: true,
            children: Vec::new(),
        }
    }

    fn child_index(&self, first: u8) -> Result<usize, usize> {
        self.children.binary_search_by_key(&first, |child| child.segment[0])
    }

    fn insert(&mut self, prefix: &[u8]) {
        let Some(&first) = prefix.first() else {
            self.terminal = true;
            self.children.clear();
            return;
        };

        let index = match self.child_index(first) {
            Ok(index) => index,
            Err(position) => {
                self.children.insert(position, Node::leaf(prefix));
                return;
            }
        };

        let child = &mut self.children[index];
        if child.terminal && prefix.starts_with(&child.segment) {
            // A shorter prefix already covers this one
            return;
        }

        let common = common_len(&child.segment, prefix);
        if common < child.segment.len() {
            let tail = Node {
                segment: child.segment[common..].into(),
                terminal: child.terminal,
                children: std::mem::take(&mut child.children),
            };
            child.segment = prefix[..common].into();
            child.terminal = false;
            child.children.push(tail);
        }
        child.insert(&prefix[common..]);
    }

    fn count_terminals(&self) -> usize {
        usize::from(self.terminal) + self.children.iter().map(Node::count_terminals).sum::<usize>()
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        for child in &self.children {
            for _ in 0..depth {
                f.write_str("\t")?;
            }
            writeln!(
                f,
                "'{}'{}",
                String::from_utf8_lossy(&child.segment),
                if child.terminal { " *" } else { "" }
            )?;
            child.write_tree(f, depth + 1)?;
        }
        Ok(())
    }
}

fn common_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// Compiled set of message prefixes.
///
/// Prefixes sharing leading bytes share edges, so a lookup reads the text
/// once from the start and stops at the first terminal edge. Matching is on
/// UTF-8 bytes, which agrees with [`str::starts_with`].
///
/// ```
/// use linelog::core::PrefixTrie;
///
/// let trie = PrefixTrie::new(["Loading ", "Loaded ", "Unloading"]);
/// assert!(trie.matches("Loaded 12 assets"));
/// assert!(!trie.matches("Load"));
/// ```
#[derive(Clone, Default)]
pub struct PrefixTrie {
    root: Node,
}

impl PrefixTrie {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut sorted: Vec<S> = prefixes.into_iter().collect();
        sorted.sort_by(|a, b| a.as_ref().cmp(b.as_ref()));
        sorted.dedup_by(|a, b| a.as_ref() == b.as_ref());

        let mut root = Node::default();
        for prefix in &sorted {
            if root.terminal {
                break;
            }
            root.insert(prefix.as_ref().as_bytes());
        }
        Self { root }
    }

    /// True if `text` starts with at least one of the prefixes.
    pub fn matches(&self, text: &str) -> bool {
        let mut node = &self.root;
        let mut rest = text.as_bytes();
        loop {
            if node.terminal {
                return true;
            }
            let Some(&first) = rest.first() else {
                return false;
            };
            let Ok(index) = node.child_index(first) else {
                return false;
            };
            let child = &node.children[index];
            if !rest.starts_with(&child.segment) {
                return false;
            }
            rest = &rest[child.segment.len()..];
            node = child;
        }
    }

    /// True when built from the empty prefix, which every text starts with
    pub fn matches_everything(&self) -> bool {
        self.root.terminal
    }

    /// Number of prefixes that survived deduplication and shadowing
    pub fn len(&self) -> usize {
        self.root.count_terminals()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for PrefixTrie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.root.terminal {
            return f.write_str("PrefixTrie(*)");
        }
        f.write_str("PrefixTrie\n")?;
        self.root.write_tree(f, 1)
    }
}
