//! Decision-tree construction: an id-addressed node arena (`node`), raw
//! candidate-gain generation (`splitter`), and DFS/BFS/3-node growth
//! (`growth`).

pub mod growth;
pub mod node;
pub mod splitter;

pub use growth::{grow_bfs, grow_dfs, GrowthInputs};
pub use node::{Node, Tree};
pub use splitter::SplitCandidate;
