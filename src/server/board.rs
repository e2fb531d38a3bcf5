//! Submissions and vote tallies held by the development server.

use serde::{Deserialize, Serialize};

/// A submission row as sent on the leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub submission_id: String,
    pub username: String,
    pub scene_name: String,
    pub vote_count: i64,
}

/// In-memory vote board.
#[derive(Debug, Default)]
pub struct Board {
    /// In creation order
    submissions: Vec<Submission>,
    total_votes: i64,
    next_id: u64,
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    /// A board with a few submissions to vote on.
    pub fn demo() -> Self {
        let mut board = Self::new();
        board.add("ana", "Rooftop at dusk");
        board.add("bo", "Night market");
        board.add("cy", "Harbour fog");
        board
    }

    /// Creates a submission with no votes.
    pub fn add(&mut self, username: &str, scene_name: &str) -> Submission {
        self.next_id += 1;
        let submission = Submission {
            submission_id: format!("sub-{}", self.next_id),
            username: username.to_string(),
            scene_name: scene_name.to_string(),
            vote_count: 0,
        };
        self.submissions.push(submission.clone());
        submission
    }

    /// Counts one vote and returns the submission's new total, or `None`
    /// if the board has no submission with that id.
    pub fn vote(&mut self, submission_id: &str) -> Option<i64> {
        let submission = self
            .submissions
            .iter_mut()
            .find(|s| s.submission_id == submission_id)?;
        submission.vote_count += 1;
        self.total_votes += 1;
        Some(submission.vote_count)
    }

    /// Submissions by vote count, highest first; ties keep creation order.
    pub fn leaderboard(&self) -> Vec<Submission> {
        let mut rows = self.submissions.clone();
        rows.sort_by(|a, b| b.vote_count.cmp(&a.vote_count));
        rows
    }

    pub fn total_votes(&self) -> i64 {
        self.total_votes
    }

    pub fn total_submissions(&self) -> usize {
        self.submissions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_assigns_ids() {
        let mut board = Board::new();
        let first = board.add("ana", "Rooftop");
        let second = board.add("bo", "Market");

        assert_eq!(first.submission_id, "sub-1");
        assert_eq!(second.submission_id, "sub-2");
        assert_eq!(board.total_submissions(), 2);
    }

    #[test]
    fn test_vote_ranks_leaderboard() {
        let mut board = Board::demo();

        assert_eq!(board.vote("sub-3"), Some(1));
        assert_eq!(board.vote("sub-3"), Some(2));
        assert_eq!(board.vote("sub-2"), Some(1));

        let ids: Vec<_> = board
            .leaderboard()
            .into_iter()
            .map(|s| s.submission_id)
            .collect();
        assert_eq!(ids, vec!["sub-3", "sub-2", "sub-1"]);
        assert_eq!(board.total_votes(), 3);
    }

    #[test]
    fn test_vote_for_unknown_id_is_rejected() {
        let mut board = Board::demo();
        assert_eq!(board.vote("sub-4"), None);
        assert_eq!(board.total_votes(), 0);
        assert_eq!(board.total_submissions(), 3);

        // the id is still free for the next real submission
        let added = board.add("dee", "Tram window");
        assert_eq!(added.submission_id, "sub-4");
        assert_eq!(board.vote("sub-4"), Some(1));
        let ids: Vec<_> = board
            .leaderboard()
            .into_iter()
            .filter(|s| s.submission_id == "sub-4")
            .collect();
        assert_eq!(ids.len(), 1);
    }
}
