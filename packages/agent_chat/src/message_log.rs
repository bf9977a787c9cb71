//! Append-only chat transcript with a follow-the-tail scroll position.

use std::collections::{VecDeque, vec_deque};

use chrono::{DateTime, Local};
use serde::Serialize;

/// One line of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub content: String,
    pub is_user: bool,
    #[serde(skip)]
    pub received_at: DateTime<Local>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_user: true,
            received_at: Local::now(),
        }
    }

    pub fn agent(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_user: false,
            received_at: Local::now(),
        }
    }
}

/// Where the log view is anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scroll {
    /// Pinned to the newest entry.
    #[default]
    Tail,
    /// Scrolled back this many rendered lines from the bottom.
    Back(usize),
}

/// Ordered sequence of chat entries. Entries are only ever added at the tail;
/// when a capacity is set the oldest entries are evicted first.
#[derive(Debug, Default)]
pub struct MessageLog {
    entries: VecDeque<ChatMessage>,
    capacity: Option<usize>,
    scroll: Scroll,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity_limit(capacity: Option<usize>) -> Self {
        Self {
            capacity: capacity.filter(|&c| c > 0),
            ..Self::default()
        }
    }

    pub fn append(&mut self, message: ChatMessage) {
        if let Some(cap) = self.capacity {
            while self.entries.len() >= cap {
                self.entries.pop_front();
            }
        }
        self.entries.push_back(message);
        self.scroll = Scroll::Tail;
    }

    pub fn entries(&self) -> vec_deque::Iter<'_, ChatMessage> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.entries.back()
    }

    pub fn scroll(&self) -> Scroll {
        self.scroll
    }

    pub fn scroll_back(&mut self, lines: usize) {
        self.scroll = match self.scroll {
            Scroll::Tail => Scroll::Back(lines),
            Scroll::Back(n) => Scroll::Back(n.saturating_add(lines)),
        };
    }

    pub fn scroll_forward(&mut self, lines: usize) {
        self.scroll = match self.scroll {
            Scroll::Back(n) if n > lines => Scroll::Back(n - lines),
            _ => Scroll::Tail,
        };
    }

    /// Top row to render given the total rendered height and the viewport
    /// height. Clamps a scroll-back that overshoots the start of the log.
    pub fn viewport_top(&mut self, content_height: usize, viewport_height: usize) -> usize {
        let max_top = content_height.saturating_sub(viewport_height);
        match self.scroll {
            Scroll::Tail => max_top,
            Scroll::Back(n) => {
                let n = n.min(max_top);
                self.scroll = if n == 0 { Scroll::Tail } else { Scroll::Back(n) };
                max_top - n
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn contents(log: &MessageLog) -> Vec<(String, bool)> {
        log.entries()
            .map(|m| (m.content.clone(), m.is_user))
            .collect()
    }

    #[test]
    fn append_keeps_insertion_order() {
        let mut log = MessageLog::new();
        log.append(ChatMessage::user("hi"));
        log.append(ChatMessage::agent("hello"));
        log.append(ChatMessage::user("how are you"));
        assert_eq!(
            contents(&log),
            vec![
                ("hi".to_string(), true),
                ("hello".to_string(), false),
                ("how are you".to_string(), true),
            ]
        );
        assert_eq!(log.last().unwrap().content, "how are you");
    }

    #[test]
    fn append_snaps_scroll_to_tail() {
        let mut log = MessageLog::new();
        log.append(ChatMessage::agent("one"));
        log.scroll_back(5);
        assert_eq!(log.scroll(), Scroll::Back(5));
        log.append(ChatMessage::agent("two"));
        assert_eq!(log.scroll(), Scroll::Tail);
    }

    #[test]
    fn capacity_evicts_oldest_first() {
        let mut log = MessageLog::with_capacity_limit(Some(2));
        log.append(ChatMessage::user("a"));
        log.append(ChatMessage::agent("b"));
        log.append(ChatMessage::user("c"));
        assert_eq!(
            contents(&log),
            vec![("b".to_string(), false), ("c".to_string(), true)]
        );
    }

    #[test]
    fn zero_capacity_means_unbounded() {
        let mut log = MessageLog::with_capacity_limit(Some(0));
        for i in 0..10 {
            log.append(ChatMessage::agent(i.to_string()));
        }
        assert_eq!(log.len(), 10);
    }

    #[test]
    fn viewport_top_follows_tail() {
        let mut log = MessageLog::new();
        assert_eq!(log.viewport_top(30, 10), 20);
        assert_eq!(log.viewport_top(5, 10), 0);
    }

    #[test]
    fn viewport_top_clamps_scroll_back() {
        let mut log = MessageLog::new();
        log.scroll_back(3);
        assert_eq!(log.viewport_top(30, 10), 17);
        log.scroll_back(100);
        assert_eq!(log.viewport_top(30, 10), 0);
        assert_eq!(log.scroll(), Scroll::Back(20));
        log.scroll_forward(25);
        assert_eq!(log.scroll(), Scroll::Tail);
    }

    #[test]
    fn serializes_with_camel_case_origin() {
        let json = serde_json::to_value(ChatMessage::user("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"content": "hi", "isUser": true}));
    }

    proptest! {
        #[test]
        fn render_order_equals_append_order(
            msgs in proptest::collection::vec((".{0,16}", any::<bool>()), 0..64)
        ) {
            let mut log = MessageLog::new();
            let mut snapshots: Vec<Vec<(String, bool)>> = Vec::new();
            for (content, is_user) in &msgs {
                let msg = if *is_user {
                    ChatMessage::user(content.clone())
                } else {
                    ChatMessage::agent(content.clone())
                };
                log.append(msg);
                snapshots.push(contents(&log));
            }
            prop_assert_eq!(contents(&log), msgs.clone());
            // Every earlier snapshot is a prefix of the final log
            let final_entries = contents(&log);
            for snap in snapshots {
                prop_assert_eq!(&final_entries[..snap.len()], &snap[..]);
            }
        }

        #[test]
        fn bounded_log_keeps_newest_in_order(
            msgs in proptest::collection::vec((".{0,16}", any::<bool>()), 0..64),
            cap in 1usize..16,
        ) {
            let mut log = MessageLog::with_capacity_limit(Some(cap));
            for (i, (content, is_user)) in msgs.iter().enumerate() {
                let msg = if *is_user {
                    ChatMessage::user(content.clone())
                } else {
                    ChatMessage::agent(content.clone())
                };
                log.append(msg);
                prop_assert_eq!(log.len(), (i + 1).min(cap));
            }
            let survivors = &msgs[msgs.len().saturating_sub(cap)..];
            prop_assert_eq!(contents(&log), survivors.to_vec());
        }
    }
}
