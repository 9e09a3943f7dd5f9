use super::statement::StatId;

/// Index of an edge in the statement graph arena.
pub type EdgeId = usize;

bitflags! {
    /// Statement edge types. The two high bits are aggregate buckets used
    /// for queries; an edge itself always carries exactly one low bit.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct EdgeType: u32 {
        const REGULAR = 1;
        const EXCEPTION = 2;
        const BREAK = 4;
        const CONTINUE = 8;
        const FINALLY_EXIT = 32;
        /// Every non-exception edge.
        const DIRECT_ALL = 0x4000_0000;
        /// Every edge.
        const ALL = 0x8000_0000;
    }
}

impl EdgeType {
    /// Per-type buckets, in the order multi-type queries concatenate them.
    pub const TYPES: [EdgeType; 5] = [
        EdgeType::REGULAR,
        EdgeType::EXCEPTION,
        EdgeType::BREAK,
        EdgeType::CONTINUE,
        EdgeType::FINALLY_EXIT,
    ];

    /// Buckets an edge of this type is registered in.
    pub fn buckets(self) -> &'static [EdgeType] {
        const EXC: [EdgeType; 2] = [EdgeType::ALL, EdgeType::EXCEPTION];
        const REG: [EdgeType; 3] = [EdgeType::ALL, EdgeType::DIRECT_ALL, EdgeType::REGULAR];
        const BRK: [EdgeType; 3] = [EdgeType::ALL, EdgeType::DIRECT_ALL, EdgeType::BREAK];
        const CNT: [EdgeType; 3] = [EdgeType::ALL, EdgeType::DIRECT_ALL, EdgeType::CONTINUE];
        const FIN: [EdgeType; 3] = [EdgeType::ALL, EdgeType::DIRECT_ALL, EdgeType::FINALLY_EXIT];
        if self == EdgeType::EXCEPTION {
            &EXC
        } else if self == EdgeType::BREAK {
            &BRK
        } else if self == EdgeType::CONTINUE {
            &CNT
        } else if self == EdgeType::FINALLY_EXIT {
            &FIN
        } else {
            &REG
        }
    }

    pub(crate) fn bucket_index(self) -> usize {
        if self == EdgeType::ALL {
            0
        } else if self == EdgeType::DIRECT_ALL {
            1
        } else if self == EdgeType::REGULAR {
            2
        } else if self == EdgeType::EXCEPTION {
            3
        } else if self == EdgeType::BREAK {
            4
        } else if self == EdgeType::CONTINUE {
            5
        } else {
            6
        }
    }

    pub fn is_single(self) -> bool {
        self.bits().is_power_of_two()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Backward,
    Forward,
}

#[derive(Clone, Debug)]
pub struct StatEdge {
    pub edge_type: EdgeType,
    pub source: StatId,
    pub destination: StatId,
    /// Caught types of an exception edge, `None` for catch-all.
    pub exceptions: Option<Vec<String>>,
    /// Statement owning the label this edge jumps to.
    pub closure: Option<StatId>,
    pub labeled: bool,
    pub explicit: bool,
    pub can_inline: bool,
    /// Set once the edge has been detached from both endpoints.
    pub removed: bool,
}

impl StatEdge {
    pub fn new(edge_type: EdgeType, source: StatId, destination: StatId, closure: Option<StatId>) -> Self {
        StatEdge {
            edge_type,
            source,
            destination,
            exceptions: None,
            closure,
            labeled: true,
            explicit: true,
            can_inline: true,
            removed: false,
        }
    }

    pub fn exception(source: StatId, destination: StatId, exceptions: Option<Vec<String>>) -> Self {
        StatEdge {
            exceptions,
            ..StatEdge::new(EdgeType::EXCEPTION, source, destination, None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exception_edges_skip_direct_bucket() {
        assert_eq!(EdgeType::EXCEPTION.buckets(), &[EdgeType::ALL, EdgeType::EXCEPTION]);
        assert!(EdgeType::BREAK.buckets().contains(&EdgeType::DIRECT_ALL));
    }

    #[test]
    fn single_bit_detection() {
        assert!(EdgeType::ALL.is_single());
        assert!(!(EdgeType::BREAK | EdgeType::CONTINUE).is_single());
    }
}
