//! Atomic write batches.

use tessera_types::Location;

/// A single write command.
#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    HSet {
        key: String,
        field: String,
        value: String,
    },
    HDel {
        key: String,
        field: String,
    },
    SAdd {
        key: String,
        members: Vec<String>,
    },
    SRem {
        key: String,
        members: Vec<String>,
    },
    ZAdd {
        key: String,
        members: Vec<(String, f64)>,
    },
    ZRem {
        key: String,
        members: Vec<String>,
    },
    GeoAdd {
        key: String,
        member: String,
        location: Location,
    },
    GeoRem {
        key: String,
        member: String,
    },
    Del {
        key: String,
    },
}

impl Op {
    /// The key this command writes to.
    pub fn key(&self) -> &str {
        match self {
            Self::HSet { key, .. }
            | Self::HDel { key, .. }
            | Self::SAdd { key, .. }
            | Self::SRem { key, .. }
            | Self::ZAdd { key, .. }
            | Self::ZRem { key, .. }
            | Self::GeoAdd { key, .. }
            | Self::GeoRem { key, .. }
            | Self::Del { key } => key,
        }
    }
}

/// An ordered list of writes applied all-or-nothing.
///
/// Commands run in insertion order, so a `Del` followed by an `SAdd` on the
/// same key replaces the set's contents.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Batch {
    ops: Vec<Op>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn push(&mut self, op: Op) -> &mut Self {
        self.ops.push(op);
        self
    }

    /// Append every command of `other` after the commands of `self`.
    pub fn append(&mut self, other: Batch) -> &mut Self {
        self.ops.extend(other.ops);
        self
    }

    pub fn hset(
        &mut self,
        key: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.push(Op::HSet {
            key: key.into(),
            field: field.into(),
            value: value.into(),
        })
    }

    pub fn hdel(&mut self, key: impl Into<String>, field: impl Into<String>) -> &mut Self {
        self.push(Op::HDel {
            key: key.into(),
            field: field.into(),
        })
    }

    pub fn sadd(&mut self, key: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.sadd_all(key, [member.into()])
    }

    /// Add several members at once. An empty member list is skipped.
    pub fn sadd_all<I>(&mut self, key: impl Into<String>, members: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let members: Vec<String> = members.into_iter().map(Into::into).collect();
        if members.is_empty() {
            return self;
        }
        self.push(Op::SAdd {
            key: key.into(),
            members,
        })
    }

    pub fn srem(&mut self, key: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.push(Op::SRem {
            key: key.into(),
            members: vec![member.into()],
        })
    }

    pub fn zadd(
        &mut self,
        key: impl Into<String>,
        member: impl Into<String>,
        score: f64,
    ) -> &mut Self {
        self.zadd_all(key, [(member.into(), score)])
    }

    /// Add several scored members at once. An empty member list is skipped.
    pub fn zadd_all<I>(&mut self, key: impl Into<String>, members: I) -> &mut Self
    where
        I: IntoIterator<Item = (String, f64)>,
    {
        let members: Vec<(String, f64)> = members.into_iter().collect();
        if members.is_empty() {
            return self;
        }
        self.push(Op::ZAdd {
            key: key.into(),
            members,
        })
    }

    pub fn zrem(&mut self, key: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.push(Op::ZRem {
            key: key.into(),
            members: vec![member.into()],
        })
    }

    pub fn geoadd(
        &mut self,
        key: impl Into<String>,
        member: impl Into<String>,
        location: Location,
    ) -> &mut Self {
        self.push(Op::GeoAdd {
            key: key.into(),
            member: member.into(),
            location,
        })
    }

    pub fn georem(&mut self, key: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.push(Op::GeoRem {
            key: key.into(),
            member: member.into(),
        })
    }

    pub fn del(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(Op::Del { key: key.into() })
    }
}

impl IntoIterator for Batch {
    type Item = Op;
    type IntoIter = std::vec::IntoIter<Op>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}
