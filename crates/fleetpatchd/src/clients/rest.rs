//! REST-backed collaborators for the management plane and the telemetry
//! backend.
//!
//! Thin glue: typed request/response models, bearer auth, status checks.
//! Everything interesting happens in `fleetpatch_common`; this module
//! only moves JSON. The bearer token is environment-provided (credential
//! acquisition is out of scope).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use fleetpatch_common::config::Config;
use fleetpatch_common::error::FleetError;
use fleetpatch_common::machine::{MachineSource, OsKind, TargetMachine};
use fleetpatch_common::policy::PatchPolicy;
use fleetpatch_common::schedule::{
    MaintenanceWindow, SavedSearchTarget, ScheduleConfiguration, REBOOT_SETTING,
    WINDOW_DURATION_HOURS,
};
use fleetpatch_common::telemetry::{LogsTable, QueryOutcome};

use super::{Inventory, ScheduleRef, ScheduleStore, Telemetry};

const SUBSCRIPTIONS_API_VERSION: &str = "2022-12-01";
const COMPUTE_API_VERSION: &str = "2023-07-01";
const HYBRID_API_VERSION: &str = "2022-12-27";
const AUTOMATION_API_VERSION: &str = "2019-06-01";
const WORKSPACE_API_VERSION: &str = "2022-10-01";

const START_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

fn http_client(timeout_secs: u64) -> Result<reqwest::Client, FleetError> {
    reqwest::Client::builder()
        .user_agent("fleetpatchd")
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| FleetError::Http(e.to_string()))
}

/// Management-plane client: inventory and the scheduler store.
pub struct ArmClient {
    http: reqwest::Client,
    base: String,
    token: String,
    subscription_id: String,
    resource_group: String,
    automation_account: String,
    tag_key: String,
    tag_prefix: String,
}

impl ArmClient {
    pub fn new(config: &Config, token: String) -> Result<Self, FleetError> {
        Ok(Self {
            http: http_client(config.endpoints.request_timeout_secs)?,
            base: config.endpoints.management_base.trim_end_matches('/').to_string(),
            token,
            subscription_id: config.account.subscription_id.clone(),
            resource_group: config.account.resource_group.clone(),
            automation_account: config.account.automation_account.clone(),
            tag_key: config.policy.tag_key.clone(),
            tag_prefix: config.policy.tag_prefix.clone(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, FleetError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| FleetError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FleetError::Api(format!(
                "GET {} failed: {}",
                url,
                response.status()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| FleetError::Http(e.to_string()))
    }

    /// Follow `nextLink` paging until the listing is exhausted.
    async fn get_paged<T: serde::de::DeserializeOwned>(
        &self,
        first_url: &str,
    ) -> Result<Vec<T>, FleetError> {
        let mut items = Vec::new();
        let mut url = Some(first_url.to_string());

        while let Some(current) = url.take() {
            let page: ListEnvelope<T> = self.get_json(&current).await?;
            items.extend(page.value);
            url = page.next_link;
        }

        Ok(items)
    }

    /// Resource id of the workspace linked to the automation account.
    /// Run-fatal when unresolvable: every query depends on it.
    pub async fn linked_workspace(&self) -> Result<String, FleetError> {
        let url = format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Automation/automationAccounts/{}/linkedWorkspace?api-version={}",
            self.base, self.subscription_id, self.resource_group, self.automation_account,
            AUTOMATION_API_VERSION
        );
        let linked: LinkedWorkspaceDto = self
            .get_json(&url)
            .await
            .map_err(|e| FleetError::WorkspaceResolution(e.to_string()))?;

        if linked.id.is_empty() {
            return Err(FleetError::WorkspaceResolution(
                "automation account has no linked workspace".to_string(),
            ));
        }
        Ok(linked.id)
    }

    /// The workspace customer id the telemetry endpoint is keyed by.
    pub async fn workspace_customer_id(&self, workspace_name: &str) -> Result<String, FleetError> {
        let url = format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.OperationalInsights/workspaces/{}?api-version={}",
            self.base, self.subscription_id, self.resource_group, workspace_name,
            WORKSPACE_API_VERSION
        );
        let workspace: WorkspaceDto = self
            .get_json(&url)
            .await
            .map_err(|e| FleetError::WorkspaceResolution(e.to_string()))?;

        workspace
            .properties
            .and_then(|p| p.customer_id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                FleetError::WorkspaceResolution(format!(
                    "workspace {} has no customer id",
                    workspace_name
                ))
            })
    }

    async fn list_subscriptions(&self) -> Result<Vec<String>, FleetError> {
        let url = format!(
            "{}/subscriptions?api-version={}",
            self.base, SUBSCRIPTIONS_API_VERSION
        );
        let subs: Vec<SubscriptionDto> = self.get_paged(&url).await?;
        Ok(subs.into_iter().map(|s| s.subscription_id).collect())
    }

    async fn list_virtual_machines(
        &self,
        subscription_id: &str,
    ) -> Result<Vec<TargetMachine>, FleetError> {
        let url = format!(
            "{}/subscriptions/{}/providers/Microsoft.Compute/virtualMachines?api-version={}",
            self.base, subscription_id, COMPUTE_API_VERSION
        );
        let vms: Vec<VmDto> = self.get_paged(&url).await?;
        Ok(vms.into_iter().map(|vm| self.vm_to_machine(vm)).collect())
    }

    fn vm_to_machine(&self, vm: VmDto) -> TargetMachine {
        let os = vm
            .properties
            .as_ref()
            .and_then(|p| p.storage_profile.as_ref())
            .and_then(|s| s.os_disk.as_ref())
            .and_then(|d| d.os_type.as_deref())
            .map(OsKind::from_descriptor)
            .unwrap_or(OsKind::Other);

        TargetMachine {
            policy: self.policy_from_tags(&vm.tags),
            resource_group: resource_group_from_id(&vm.id),
            identity: vm.id,
            name: vm.name,
            os,
            source: MachineSource::CloudVm,
        }
    }

    fn policy_from_tags(&self, tags: &HashMap<String, String>) -> Option<PatchPolicy> {
        tags.get(&self.tag_key)
            .and_then(|raw| PatchPolicy::parse(&self.tag_prefix, raw))
    }
}

#[async_trait]
impl Inventory for ArmClient {
    /// All cloud-native machines across every subscription the token can
    /// see, with tags parsed into policies.
    async fn list_all(&self) -> Result<Vec<TargetMachine>, FleetError> {
        let mut machines = Vec::new();
        for subscription in self.list_subscriptions().await? {
            debug!("listing virtual machines in subscription {}", subscription);
            machines.extend(self.list_virtual_machines(&subscription).await?);
        }
        Ok(machines)
    }

    async fn get(&self, resource_group: &str, name: &str) -> Result<TargetMachine, FleetError> {
        let url = format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.HybridCompute/machines/{}?api-version={}",
            self.base, self.subscription_id, resource_group, name, HYBRID_API_VERSION
        );

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| FleetError::Http(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(FleetError::MachineLookup(name.to_string()));
        }
        if !response.status().is_success() {
            return Err(FleetError::Api(format!(
                "GET {} failed: {}",
                url,
                response.status()
            )));
        }

        let machine: HybridMachineDto = response
            .json()
            .await
            .map_err(|e| FleetError::Http(e.to_string()))?;

        let os = machine
            .properties
            .as_ref()
            .and_then(|p| p.os_type.as_deref())
            .map(OsKind::from_descriptor)
            .unwrap_or(OsKind::Other);

        Ok(TargetMachine {
            policy: self.policy_from_tags(&machine.tags),
            resource_group: resource_group.to_string(),
            identity: machine.id,
            name: machine.name,
            os,
            source: MachineSource::HybridHost,
        })
    }
}

#[async_trait]
impl ScheduleStore for ArmClient {
    async fn list(&self) -> Result<Vec<ScheduleRef>, FleetError> {
        let url = format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Automation/automationAccounts/{}/softwareUpdateConfigurations?api-version={}",
            self.base, self.subscription_id, self.resource_group, self.automation_account,
            AUTOMATION_API_VERSION
        );
        let envelope: ListEnvelope<SucNameDto> = self.get_json(&url).await?;
        Ok(envelope
            .value
            .into_iter()
            .map(|s| ScheduleRef { name: s.name })
            .collect())
    }

    async fn get_by_name(&self, name: &str) -> Result<ScheduleConfiguration, FleetError> {
        let url = format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Automation/automationAccounts/{}/softwareUpdateConfigurations/{}?api-version={}",
            self.base, self.subscription_id, self.resource_group, self.automation_account,
            name, AUTOMATION_API_VERSION
        );
        let envelope: SucEnvelope = self.get_json(&url).await?;
        suc_to_domain(name, envelope.properties)
    }

    async fn upsert(&self, name: &str, config: &ScheduleConfiguration) -> Result<(), FleetError> {
        let url = format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Automation/automationAccounts/{}/softwareUpdateConfigurations/{}?api-version={}",
            self.base, self.subscription_id, self.resource_group, self.automation_account,
            name, AUTOMATION_API_VERSION
        );

        let body = SucEnvelope {
            name: Some(name.to_string()),
            properties: suc_from_domain(config),
        };

        let response = self
            .http
            .put(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| FleetError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(FleetError::ScheduleUpsert {
                name: name.to_string(),
                message: format!("{} {}", status, detail),
            });
        }
        Ok(())
    }
}

/// Telemetry client for the logs query endpoint.
pub struct LogsClient {
    http: reqwest::Client,
    base: String,
    token: String,
}

impl LogsClient {
    pub fn new(config: &Config, token: String) -> Result<Self, FleetError> {
        Ok(Self {
            http: http_client(config.endpoints.request_timeout_secs)?,
            base: config.endpoints.logs_base.trim_end_matches('/').to_string(),
            token,
        })
    }
}

#[async_trait]
impl Telemetry for LogsClient {
    async fn query(
        &self,
        workspace_id: &str,
        query: &str,
        lookback_hours: i64,
    ) -> Result<QueryOutcome, FleetError> {
        let url = format!("{}/v1/workspaces/{}/query", self.base, workspace_id);
        let body = LogsRequest {
            query: query.to_string(),
            timespan: format!("PT{}H", lookback_hours),
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| FleetError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FleetError::Api(format!(
                "POST {} failed: {}",
                url,
                response.status()
            )));
        }

        let logs: LogsResponse = response
            .json()
            .await
            .map_err(|e| FleetError::Http(e.to_string()))?;

        let table = logs
            .tables
            .into_iter()
            .next()
            .map(|t| LogsTable {
                columns: t.columns.into_iter().map(|c| c.name).collect(),
                rows: t.rows,
            })
            .unwrap_or_default();

        Ok(match logs.error {
            Some(err) => QueryOutcome::partial(table, format!("{}: {}", err.code, err.message)),
            None => QueryOutcome::success(table),
        })
    }
}

/// Resource group segment of a full resource id.
fn resource_group_from_id(id: &str) -> String {
    let mut segments = id.split('/');
    while let Some(segment) = segments.next() {
        if segment.eq_ignore_ascii_case("resourceGroups") {
            return segments.next().unwrap_or_default().to_string();
        }
    }
    String::new()
}

fn parse_start_time(raw: &str) -> Result<NaiveDateTime, FleetError> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(dt);
    }
    // Stored values may carry an offset suffix.
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.naive_local())
        .map_err(|_| FleetError::Api(format!("unparseable schedule start time: {}", raw)))
}

fn suc_to_domain(name: &str, props: SucProperties) -> Result<ScheduleConfiguration, FleetError> {
    let update = props.update_configuration;
    let linux = update.linux.unwrap_or_default();
    let dynamic_query = update
        .targets
        .and_then(|t| t.non_azure_queries.into_iter().next())
        .map(|q| SavedSearchTarget {
            function_alias: q.function_alias,
            workspace_id: q.workspace_id,
        });

    Ok(ScheduleConfiguration {
        name: name.to_string(),
        operating_system: update.operating_system,
        azure_machine_ids: update.azure_virtual_machines,
        machine_names: update.non_azure_computer_names,
        update_list: linux.included_package_name_masks,
        window: MaintenanceWindow {
            start: parse_start_time(&props.schedule_info.start_time)?,
            time_zone: props.schedule_info.time_zone,
            is_enabled: props.schedule_info.is_enabled,
        },
        dynamic_query,
    })
}

fn suc_from_domain(config: &ScheduleConfiguration) -> SucProperties {
    SucProperties {
        update_configuration: UpdateConfigurationDto {
            operating_system: config.operating_system.clone(),
            duration: Some(format!("PT{}H", WINDOW_DURATION_HOURS)),
            linux: Some(LinuxPropertiesDto {
                included_package_name_masks: config.update_list.clone(),
                reboot_setting: Some(REBOOT_SETTING.to_string()),
            }),
            azure_virtual_machines: config.azure_machine_ids.clone(),
            non_azure_computer_names: config.machine_names.clone(),
            targets: config.dynamic_query.as_ref().map(|q| TargetsDto {
                non_azure_queries: vec![NonAzureQueryDto {
                    function_alias: q.function_alias.clone(),
                    workspace_id: q.workspace_id.clone(),
                }],
            }),
        },
        schedule_info: ScheduleInfoDto {
            start_time: config.window.start.format(START_TIME_FORMAT).to_string(),
            time_zone: config.window.time_zone.clone(),
            is_enabled: config.window.is_enabled,
            frequency: "OneTime".to_string(),
        },
    }
}

// Wire models. Unknown fields are ignored throughout.

#[derive(Debug, Deserialize)]
struct ListEnvelope<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionDto {
    subscription_id: String,
}

#[derive(Debug, Deserialize)]
struct VmDto {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    tags: HashMap<String, String>,
    properties: Option<VmPropertiesDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VmPropertiesDto {
    storage_profile: Option<StorageProfileDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageProfileDto {
    os_disk: Option<OsDiskDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OsDiskDto {
    os_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HybridMachineDto {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    tags: HashMap<String, String>,
    properties: Option<HybridPropertiesDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HybridPropertiesDto {
    os_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LinkedWorkspaceDto {
    #[serde(default)]
    id: String,
}

#[derive(Debug, Deserialize)]
struct WorkspaceDto {
    properties: Option<WorkspacePropertiesDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkspacePropertiesDto {
    customer_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SucNameDto {
    name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct SucEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    properties: SucProperties,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SucProperties {
    update_configuration: UpdateConfigurationDto,
    schedule_info: ScheduleInfoDto,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateConfigurationDto {
    #[serde(default)]
    operating_system: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    linux: Option<LinuxPropertiesDto>,
    #[serde(default)]
    azure_virtual_machines: Vec<String>,
    #[serde(default)]
    non_azure_computer_names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    targets: Option<TargetsDto>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinuxPropertiesDto {
    #[serde(default)]
    included_package_name_masks: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reboot_setting: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetsDto {
    #[serde(default)]
    non_azure_queries: Vec<NonAzureQueryDto>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NonAzureQueryDto {
    function_alias: String,
    workspace_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleInfoDto {
    start_time: String,
    time_zone: String,
    is_enabled: bool,
    frequency: String,
}

#[derive(Debug, Serialize)]
struct LogsRequest {
    query: String,
    timespan: String,
}

#[derive(Debug, Deserialize)]
struct LogsResponse {
    #[serde(default = "Vec::new")]
    tables: Vec<LogsTableDto>,
    error: Option<LogsErrorDto>,
}

#[derive(Debug, Deserialize)]
struct LogsTableDto {
    #[serde(default = "Vec::new")]
    columns: Vec<LogsColumnDto>,
    #[serde(default = "Vec::new")]
    rows: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct LogsColumnDto {
    name: String,
}

#[derive(Debug, Deserialize)]
struct LogsErrorDto {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}
