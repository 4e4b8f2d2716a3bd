//! Trophy-proximity matchmaking with an AI fallback.

use log::info;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub player_id: String,
    pub trophies: u32,
    pub joined_at: Instant,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Opponent {
    Human(QueueEntry),
    /// Synthetic opponent seeded with the waiting player's trophy count
    Ai { trophies: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pairing {
    pub home: QueueEntry,
    pub away: Opponent,
}

pub struct MatchmakingQueue {
    waiting: Vec<QueueEntry>,
    max_trophy_gap: u32,
    ai_fallback_after: Duration,
}

impl MatchmakingQueue {
    pub fn new(max_trophy_gap: u32, ai_fallback_after: Duration) -> Self {
        Self {
            waiting: Vec::new(),
            max_trophy_gap,
            ai_fallback_after,
        }
    }

    /// Adds a player at the back of the queue; returns false if already queued
    pub fn enqueue(&mut self, player_id: &str, trophies: u32, now: Instant) -> bool {
        if self.contains(player_id) {
            return false;
        }
        info!("{} entered queue ({} trophies)", player_id, trophies);
        self.waiting.push(QueueEntry {
            player_id: player_id.to_string(),
            trophies,
            joined_at: now,
        });
        true
    }

    pub fn remove(&mut self, player_id: &str) -> Option<QueueEntry> {
        let index = self.waiting.iter().position(|e| e.player_id == player_id)?;
        Some(self.waiting.remove(index))
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.waiting.iter().any(|e| e.player_id == player_id)
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }

    /// Pairs the first two entries, in queue order, whose trophies are within
    /// the allowed gap. Failing that, the head of the queue is paired with the
    /// AI once it has waited longer than the fallback delay.
    pub fn try_match(&mut self, now: Instant) -> Option<Pairing> {
        for i in 0..self.waiting.len() {
            for j in (i + 1)..self.waiting.len() {
                let gap = self.waiting[i].trophies.abs_diff(self.waiting[j].trophies);
                if gap <= self.max_trophy_gap {
                    let away = self.waiting.remove(j);
                    let home = self.waiting.remove(i);
                    return Some(Pairing {
                        home,
                        away: Opponent::Human(away),
                    });
                }
            }
        }

        let head = self.waiting.first()?;
        if now.saturating_duration_since(head.joined_at) > self.ai_fallback_after {
            let home = self.waiting.remove(0);
            let trophies = home.trophies;
            return Some(Pairing {
                home,
                away: Opponent::Ai { trophies },
            });
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> MatchmakingQueue {
        MatchmakingQueue::new(500, Duration::from_secs(5))
    }

    #[test]
    fn test_enqueue_rejects_duplicates() {
        let mut queue = queue();
        let now = Instant::now();
        assert!(queue.enqueue("alice", 1000, now));
        assert!(!queue.enqueue("alice", 1000, now));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_pairs_players_within_gap() {
        let mut queue = queue();
        let now = Instant::now();
        queue.enqueue("alice", 1000, now);
        queue.enqueue("bob", 1200, now);

        let pairing = queue.try_match(now).unwrap();

        assert_eq!(pairing.home.player_id, "alice");
        match pairing.away {
            Opponent::Human(entry) => assert_eq!(entry.player_id, "bob"),
            other => panic!("expected human opponent, got {:?}", other),
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_gap_boundary_is_inclusive() {
        let mut queue = queue();
        let now = Instant::now();
        queue.enqueue("alice", 1000, now);
        queue.enqueue("bob", 1501, now);
        assert!(queue.try_match(now).is_none());

        queue.enqueue("carol", 1500, now);
        let pairing = queue.try_match(now).unwrap();
        assert_eq!(pairing.home.player_id, "alice");
        let carol = QueueEntry {
            player_id: "carol".to_string(),
            trophies: 1500,
            joined_at: now,
        };
        assert_eq!(pairing.away, Opponent::Human(carol));
        assert_eq!(queue.len(), 1);
        assert!(queue.contains("bob"));
    }

    #[test]
    fn test_first_fit_not_best_fit() {
        let mut queue = queue();
        let now = Instant::now();
        queue.enqueue("alice", 1000, now);
        queue.enqueue("bob", 1450, now);
        queue.enqueue("carol", 1001, now);

        let pairing = queue.try_match(now).unwrap();
        match pairing.away {
            Opponent::Human(entry) => assert_eq!(entry.player_id, "bob"),
            other => panic!("expected human opponent, got {:?}", other),
        }
    }

    #[test]
    fn test_ai_fallback_after_wait() {
        let mut queue = queue();
        let start = Instant::now();
        queue.enqueue("alice", 800, start);

        assert!(queue.try_match(start + Duration::from_secs(5)).is_none());

        let pairing = queue.try_match(start + Duration::from_millis(5001)).unwrap();
        assert_eq!(pairing.home.player_id, "alice");
        assert_eq!(pairing.away, Opponent::Ai { trophies: 800 });
        assert!(queue.is_empty());
    }

    #[test]
    fn test_remove() {
        let mut queue = queue();
        let now = Instant::now();
        queue.enqueue("alice", 0, now);
        assert!(queue.remove("alice").is_some());
        assert!(queue.remove("alice").is_none());
        assert!(queue.try_match(now + Duration::from_secs(60)).is_none());
    }
}
