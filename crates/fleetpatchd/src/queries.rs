//! Telemetry query texts.
//!
//! The query language itself is opaque to this system; these strings are
//! sent as-is and only their result columns matter. Machines missing from
//! the pending-updates result either do not report to the workspace (to
//! troubleshoot) or genuinely need nothing.

/// Live roster of machines heartbeating into the workspace.
pub const HEARTBEAT_ROSTER_QUERY: &str =
    "Heartbeat | distinct Computer, ResourceGroup, OSType, Resource";

/// Pending security/critical updates for all Linux machines, summarized
/// per (machine, product) and sorted by classification weight desc,
/// machine count desc, product asc. The sort is part of the contract:
/// downstream preserves it and never re-sorts.
pub fn pending_updates_query(lookback_hours: i64) -> String {
    format!(
        r#"Update
| where TimeGenerated>ago({lookback}h) and OSType=="Linux"
| summarize hint.strategy=partitioned arg_max(TimeGenerated, UpdateState, Classification, BulletinUrl, BulletinID) by ResourceId, Computer, SourceComputerId, Product, ProductArch
| where UpdateState=~"Needed"
| project-away UpdateState, TimeGenerated
| summarize computersCount=dcount(SourceComputerId, 2), ClassificationWeight=max(iff(Classification has "Critical", 4, iff(Classification has "Security", 2, 1))) by ResourceId, Computer, id=strcat(Product, "_", ProductArch), displayName=Product, productArch=ProductArch, classification=Classification, InformationId=BulletinID, InformationUrl=tostring(split(BulletinUrl, ";", 0)[0]), osType=1
| sort by ClassificationWeight desc, computersCount desc, displayName asc
| extend informationLink=(iff(isnotempty(InformationId) and isnotempty(InformationUrl), toobject(strcat('{{ "uri": "', InformationUrl, '", "text": "', InformationId, '", "target": "blank" }}')), toobject('')))
| project-away ClassificationWeight, InformationId, InformationUrl
| where classification has "Security" or classification has "Critical""#,
        lookback = lookback_hours
    )
}
