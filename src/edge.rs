use crate::node::NodeId;

slotmap::new_key_type! {
    /// Unique key assigned to an edge within a [`Runtime`](crate::Runtime)'s
    /// arena. Addressing edges by a dense integer key (rather than a
    /// `Box`/`Rc` back-pointer) is what lets the producer/consumer cycle in
    /// the data model exist without `unsafe`, per the spec's arena design
    /// note.
    pub(crate) struct EdgeId;
}

/// Transient marker used only while an edge's consumer is mid-compute. It
/// has no meaning (and is never read) outside of that window; every edge
/// is implicitly "used" once a compute finishes pruning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum EdgeMark {
    Candidate,
    Used,
}

/// A single producer → consumer link. Belongs simultaneously to
/// `producer`'s outputs list and `consumer`'s inputs list; the four
/// next/prev fields below are the intrusive doubly-linked pointers for
/// those two lists respectively.
pub(crate) struct Edge {
    pub(crate) producer: NodeId,
    pub(crate) consumer: NodeId,
    pub(crate) producer_version_at_link: u64,
    pub(crate) mark: EdgeMark,

    pub(crate) prev_in_outputs: Option<EdgeId>,
    pub(crate) next_in_outputs: Option<EdgeId>,
    pub(crate) prev_in_inputs: Option<EdgeId>,
    pub(crate) next_in_inputs: Option<EdgeId>,
}
