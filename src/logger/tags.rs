/// Log tags identifying the subsystem that produced a message
///
/// Tags keep console output scannable and allow per-subsystem filtering.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogTag {
    Cache,
    Fetch,
    Market,
    Source,
    Aggregator,
    Rpc,
    Registry,
    Config,
}

impl LogTag {
    /// Plain (uncolored) tag name for file/test output
    pub fn as_str(&self) -> &'static str {
        match self {
            LogTag::Cache => "CACHE",
            LogTag::Fetch => "FETCH",
            LogTag::Market => "MARKET",
            LogTag::Source => "SOURCE",
            LogTag::Aggregator => "AGGREGATOR",
            LogTag::Rpc => "RPC",
            LogTag::Registry => "REGISTRY",
            LogTag::Config => "CONFIG",
        }
    }
}

impl std::fmt::Display for LogTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
