//! Client-side match/chat view-model.
//!
//! Holds the local match list and the message logs of open chat threads,
//! reconciling two inputs: full snapshots fetched over REST (the source of
//! truth) and events pushed over the gateway (an optimization). Pushes can
//! race a concurrent fetch, arrive for threads that are not open, or
//! duplicate something already known. Merging is by id and append order is
//! preserved, so applying the same input twice changes nothing.

use std::collections::HashMap;

use uuid::Uuid;

use ember_types::api::{LastMessage, MatchSummary, MessageResponse};
use ember_types::events::GatewayEvent;

#[derive(Default)]
pub struct MatchViewModel {
    matches: Vec<MatchSummary>,
    threads: HashMap<Uuid, Vec<MessageResponse>>,
}

impl MatchViewModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the match list with a freshly fetched snapshot.
    pub fn load_snapshot(&mut self, matches: Vec<MatchSummary>) {
        self.matches = matches;
    }

    pub fn matches(&self) -> &[MatchSummary] {
        &self.matches
    }

    /// Start tracking a thread with its fetched message log.
    pub fn open_thread(&mut self, match_id: Uuid, messages: Vec<MessageResponse>) {
        self.threads.insert(match_id, messages);
    }

    pub fn close_thread(&mut self, match_id: Uuid) {
        self.threads.remove(&match_id);
    }

    pub fn thread(&self, match_id: Uuid) -> Option<&[MessageResponse]> {
        self.threads.get(&match_id).map(|m| m.as_slice())
    }

    /// Apply a pushed gateway event to the local state.
    pub fn apply_event(&mut self, event: GatewayEvent) {
        match event {
            GatewayEvent::Ready { .. } => {}

            GatewayEvent::MatchCreated {
                match_id,
                counterpart,
                matched_at,
            } => {
                // A concurrent full fetch may already have delivered this
                // match, so dedupe by id. New matches go first, matching
                // the server's newest-first ordering.
                if !self.matches.iter().any(|m| m.match_id == match_id) {
                    self.matches.insert(
                        0,
                        MatchSummary {
                            match_id,
                            counterpart,
                            matched_at,
                            last_message: None,
                        },
                    );
                }
            }

            GatewayEvent::MessageCreated { message, .. } => {
                self.merge_message(message);
            }
        }
    }

    /// Merge a message the local user just sent. The server never pushes a
    /// sender's own message back, so the client records it here; the merge
    /// is the same id-deduped path pushed messages take.
    pub fn note_sent(&mut self, message: MessageResponse) {
        self.merge_message(message);
    }

    fn merge_message(&mut self, message: MessageResponse) {
        if let Some(summary) = self
            .matches
            .iter_mut()
            .find(|m| m.match_id == message.match_id)
        {
            summary.last_message = Some(LastMessage {
                content: message.content.clone(),
                sender_id: message.sender_id,
                sent_at: message.sent_at,
            });
        }

        if let Some(log) = self.threads.get_mut(&message.match_id) {
            if !log.iter().any(|m| m.id == message.id) {
                log.push(message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ember_types::models::{Gender, PublicProfile};

    fn profile(name: &str) -> PublicProfile {
        PublicProfile {
            id: Uuid::new_v4(),
            display_name: name.to_string(),
            age: 25,
            gender: Gender::Other,
            bio: String::new(),
            photos: vec![],
        }
    }

    fn summary(name: &str) -> MatchSummary {
        MatchSummary {
            match_id: Uuid::new_v4(),
            counterpart: profile(name),
            matched_at: Utc::now(),
            last_message: None,
        }
    }

    fn message(match_id: Uuid, content: &str) -> MessageResponse {
        MessageResponse {
            id: Uuid::new_v4(),
            match_id,
            sender_id: Uuid::new_v4(),
            content: content.to_string(),
            sent_at: Utc::now(),
            is_read: false,
        }
    }

    fn match_created(s: &MatchSummary) -> GatewayEvent {
        GatewayEvent::MatchCreated {
            match_id: s.match_id,
            counterpart: s.counterpart.clone(),
            matched_at: s.matched_at,
        }
    }

    #[test]
    fn match_event_appends_unseen_match_first() {
        let mut vm = MatchViewModel::new();
        vm.load_snapshot(vec![summary("old")]);

        let new = summary("new");
        vm.apply_event(match_created(&new));

        assert_eq!(vm.matches().len(), 2);
        assert_eq!(vm.matches()[0].match_id, new.match_id);
    }

    #[test]
    fn match_event_racing_a_fetch_is_deduped() {
        let mut vm = MatchViewModel::new();
        let known = summary("known");
        vm.load_snapshot(vec![known.clone()]);

        vm.apply_event(match_created(&known));
        vm.apply_event(match_created(&known));

        assert_eq!(vm.matches().len(), 1);
    }

    #[test]
    fn message_event_updates_last_message_and_open_thread() {
        let mut vm = MatchViewModel::new();
        let m = summary("m");
        vm.load_snapshot(vec![m.clone()]);
        vm.open_thread(m.match_id, vec![]);

        let msg = message(m.match_id, "hi");
        vm.apply_event(GatewayEvent::MessageCreated {
            match_id: m.match_id,
            message: msg.clone(),
        });

        assert_eq!(
            vm.matches()[0].last_message.as_ref().unwrap().content,
            "hi"
        );
        let log = vm.thread(m.match_id).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].id, msg.id);
    }

    #[test]
    fn message_for_closed_thread_only_updates_last_message() {
        let mut vm = MatchViewModel::new();
        let m = summary("m");
        vm.load_snapshot(vec![m.clone()]);

        vm.apply_event(GatewayEvent::MessageCreated {
            match_id: m.match_id,
            message: message(m.match_id, "unseen"),
        });

        assert_eq!(
            vm.matches()[0].last_message.as_ref().unwrap().content,
            "unseen"
        );
        assert!(vm.thread(m.match_id).is_none());
    }

    #[test]
    fn duplicate_messages_are_ignored_and_order_kept() {
        let mut vm = MatchViewModel::new();
        let m = summary("m");
        vm.load_snapshot(vec![m.clone()]);
        vm.open_thread(m.match_id, vec![]);

        let first = message(m.match_id, "one");
        let second = message(m.match_id, "two");
        for msg in [&first, &second, &first] {
            vm.apply_event(GatewayEvent::MessageCreated {
                match_id: m.match_id,
                message: msg.clone(),
            });
        }

        let contents: Vec<&str> = vm
            .thread(m.match_id)
            .unwrap()
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, vec!["one", "two"]);
    }

    #[test]
    fn locally_sent_message_merges_through_the_same_path() {
        let mut vm = MatchViewModel::new();
        let m = summary("m");
        vm.load_snapshot(vec![m.clone()]);
        vm.open_thread(m.match_id, vec![]);

        let msg = message(m.match_id, "sent by me");
        vm.note_sent(msg.clone());
        // A later fetch-driven replay of the same message changes nothing
        vm.note_sent(msg.clone());

        assert_eq!(vm.thread(m.match_id).unwrap().len(), 1);
        assert_eq!(
            vm.matches()[0].last_message.as_ref().unwrap().content,
            "sent by me"
        );
    }
}
