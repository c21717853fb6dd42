use hashbrown::HashMap;

use crate::types::OpId;

/// Maps an id to the absolute sequence slot of the entry that holds it.
pub type SeqIndex = HashMap<OpId, u64>;
