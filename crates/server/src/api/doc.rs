//! OpenAPI document assembled from the handler annotations and payload
//! schemas. Served at /docs (Scalar UI) and reused by the discovery
//! provider for its JSON-Schema surface.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Newswire",
        description = "RSS ingestion and LLM analysis control plane"
    ),
    paths(
        super::feeds::feeds_list,
        super::feeds::feeds_create,
        super::items::items_list,
        super::analysis::analysis_preview,
        super::analysis::analysis_start,
        super::analysis::runs_get,
    ),
    components(schemas(
        newswire_core::Feed,
        newswire_core::FeedStatus,
        newswire_core::FetchLogEntry,
        newswire_core::FetchOutcome,
        newswire_core::FeedHealth,
        newswire_core::FeedLimits,
        newswire_core::Item,
        newswire_core::AnalysisRun,
        newswire_core::RunStatus,
        newswire_core::RunItem,
        newswire_core::RunItemState,
        newswire_core::RunScope,
        newswire_core::RunParams,
        newswire_core::TriggerSource,
        newswire_core::PendingAutoAnalysis,
        newswire_core::PendingStatus,
        newswire_core::SentimentPayload,
        newswire_core::OverallSentiment,
        newswire_core::MarketSentiment,
        newswire_core::SentimentLabel,
        newswire_core::TimeHorizon,
        newswire_core::ImpactPayload,
        newswire_core::GeopoliticalPayload,
        newswire_core::DiplomaticImpact,
        newswire_core::GeoTimeHorizon,
        newswire_core::ConflictType,
        newswire_core::ItemAnalysisPayload,
        newswire_core::FeedTemplate,
        newswire_core::MatchRule,
        newswire_core::Selector,
        newswire_core::FieldSelector,
        newswire_core::TemplateSelectors,
        newswire_core::ProcessingRules,
        newswire_analysis::Preview,
        newswire_analysis::RunRequest,
        newswire_analysis::GovernorStatus,
        newswire_store::CreateFeed,
        newswire_store::UpdateFeed,
        newswire_store::CreateTemplate,
        newswire_store::UpdateTemplate,
        newswire_store::SetFeedLimits,
    ))
)]
pub struct ApiDoc;
