pub mod chat;
pub mod debug;
pub mod event;
pub mod trial;

pub use chat::{
    ChartContent, ColumnType, ContentItem, Message, MessageRole, ResultSet, ResultSetMeta,
    TableContent, TranscriptEntry,
};
pub use debug::{DebugEvent, DebugRing, DEBUG_RING_CAPACITY};
pub use event::{
    AgentEvent, ChartEvent, ErrorEvent, StatusEvent, TableEvent, TextDeltaEvent, ThinkingDeltaEvent,
    ThinkingEvent, ToolEvent,
};
pub use trial::{
    build_cumulative, AgentInfo, AgentTool, CumulativePoint, EnrollmentMetrics, EnrollmentPoint,
    PortfolioSummary, TrialStatus, TrialSummary,
};
