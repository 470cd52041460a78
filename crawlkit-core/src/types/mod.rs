//! Domain model shared across all crawlkit crates.

pub mod browse_result;
pub mod confidence;
pub mod network;
pub mod patterns;
pub mod profile;
pub mod verification;
pub mod websocket;

pub use browse_result::{
    BrowseMetadata, BrowseResult, ExtractedContent, ExtractedLink, ExtractedTable, FetchTier,
    LearningSummary,
};
pub use confidence::{Confidence, ConfidenceLevel, Provenance, ProvenanceOrigin};
pub use network::{ConsoleLevel, ConsoleMessage, HttpMethod, NetworkRequest};
pub use patterns::{
    ApiMethod, ApiPattern, AuthType, ContentMapping, ContentValidator, PaginationKind,
    PaginationPattern, PatternMetrics, PatternValidation, SelectorChain, SelectorContentType,
    SelectorPattern, TemplateType,
};
pub use profile::{DomainEntry, DomainGroup, FailureContext, SuccessProfile};
pub use verification::{CheckKind, CheckSeverity, VerificationCheck, VerificationReport};
pub use websocket::{FrameShape, WebSocketConnection, WebSocketDirection, WebSocketFrame, WebSocketPattern};
