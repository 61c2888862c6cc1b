/// Crawl pipeline stages for a single channel
use std::fmt;

/// Represents the stage a channel job is in inside the crawl pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelStage {
    // ===== Active Stages =====
    /// Classifying the address and fetching channel metadata
    Resolve,

    /// Fetching the recommendation list
    FetchSimilar,

    /// Paginating messages above the stored checkpoint
    FetchMessages,

    /// Collecting forward-provenance channel ids from fetched messages
    ExtractRelated,

    /// Resolving forward-provenance ids into channel records
    ResolveRelated,

    /// Writing the channel, its edges and category link
    Persist,

    // ===== Terminal Stages =====
    /// All stages completed
    Done,

    /// The address could not be resolved to a channel
    Unresolvable,
}

impl ChannelStage {
    /// The stage that follows a successful run of this one
    ///
    /// Terminal stages return themselves.
    pub fn next(&self) -> Self {
        match self {
            Self::Resolve => Self::FetchSimilar,
            Self::FetchSimilar => Self::FetchMessages,
            Self::FetchMessages => Self::ExtractRelated,
            Self::ExtractRelated => Self::ResolveRelated,
            Self::ResolveRelated => Self::Persist,
            Self::Persist => Self::Done,
            Self::Done => Self::Done,
            Self::Unresolvable => Self::Unresolvable,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resolve => "resolve",
            Self::FetchSimilar => "fetch_similar",
            Self::FetchMessages => "fetch_messages",
            Self::ExtractRelated => "extract_related",
            Self::ResolveRelated => "resolve_related",
            Self::Persist => "persist",
            Self::Done => "done",
            Self::Unresolvable => "unresolvable",
        }
    }
}

impl fmt::Display for ChannelStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
