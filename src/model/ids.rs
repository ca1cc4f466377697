use std::fmt;

/// `<uuid>:<shard_name>` (`spec.md` §6, "Stream id format"). The shard-name
/// suffix lets any router resolve a stream to its owning shard without a
/// lookup, so the type keeps both halves around instead of collapsing to a
/// bare string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(String);

impl StreamId {
    pub fn new(uuid: uuid::Uuid, shard_name: &str) -> Self {
        StreamId(format!("{uuid}:{shard_name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The shard-name suffix after the last `:`.
    pub fn shard_name(&self) -> &str {
        self.0.rsplit(':').next().unwrap_or(&self.0)
    }

    /// Filesystem-safe representation: the stream directory uses the id
    /// verbatim as `streams/<id>/`, which is safe because a `StreamId` is
    /// always `<uuid>:<shard_name>` and never contains path separators.
    pub fn as_dirname(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for StreamId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(StreamId(s.to_owned()))
    }
}

impl serde::Serialize for StreamId {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for StreamId {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        String::deserialize(d).map(StreamId)
    }
}

/// Opaque target identity, owned by the router's target catalog (`spec.md`
/// §1). The shard treats it as an opaque string key.
pub type TargetId = String;
