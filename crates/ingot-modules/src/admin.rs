//! Administration module.
//!
//! Three responsibilities:
//!
//! - installs the per-group **module gate**: before any registration's own
//!   filters run, dispatch consults persisted per-(module, group) overrides,
//!   falling back to the module's default-enabled flag.  Private chats are
//!   exempt from the gating.
//! - maintains the **pending request queue**: group invites are parked with
//!   a numeric ticket and a 24h expiry, and announced to the configured
//!   admins, who approve or reject by private message.
//! - exposes the per-group **enable/disable commands**, both in-group (for
//!   group admins, via a mention) and over private chat.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ingot_core::{BoxedGateway, MessageEvent, RequestEvent, RequestSubType, RequestType};
use ingot_framework::{
    BoxError, FilterResult, MessageFilter, Module, ModuleCatalog, ModuleContext, ModuleError,
    ModuleInfo, RequestFilter, Storage, filters,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);
const REQUEST_TIMEOUT_LABEL: &str = "1天";

struct PendingInvite {
    expires_at: Instant,
    event: RequestEvent,
}

/// The administration module.
pub struct AdminControl {
    admins: Vec<i64>,
    requests: Arc<Mutex<HashMap<u32, PendingInvite>>>,
    shutdown: CancellationToken,
}

impl AdminControl {
    /// `admins` may approve requests and manage modules anywhere; the
    /// `shutdown` token is cancelled by the `exit` command.
    pub fn new(admins: Vec<i64>, shutdown: CancellationToken) -> Self {
        Self {
            admins,
            requests: Arc::new(Mutex::new(HashMap::new())),
            shutdown,
        }
    }

    fn admin_filter(&self) -> MessageFilter {
        let admins = self.admins.clone();
        Arc::new(move |event, _| FilterResult::from_bool(admins.contains(&event.user_id)))
    }
}

impl Module for AdminControl {
    fn info(&self) -> ModuleInfo {
        ModuleInfo::new("admin_control", "管理模块")
    }

    fn init(&self, ctx: ModuleContext) -> Result<(), ModuleError> {
        let enable = ctx.storage.child("enable");
        install_gate(&ctx, enable.clone())?;

        let bus = &ctx.bus;

        // Private approval commands from configured admins.
        {
            let gateway = Arc::clone(&ctx.gateway);
            let requests = Arc::clone(&self.requests);
            let shutdown = self.shutdown.clone();
            bus.register_message(
                vec![filters::private(), self.admin_filter()],
                move |event: MessageEvent| {
                    let gateway = Arc::clone(&gateway);
                    let requests = Arc::clone(&requests);
                    let shutdown = shutdown.clone();
                    async move { on_admin_command(&gateway, &requests, &shutdown, &event).await }
                },
            );
        }

        // Private module management for group members/admins.
        {
            let gateway = Arc::clone(&ctx.gateway);
            let catalog = ctx.catalog.clone();
            let admins = self.admins.clone();
            let enable = enable.clone();
            bus.register_private(move |event: MessageEvent| {
                let gateway = Arc::clone(&gateway);
                let catalog = catalog.clone();
                let admins = admins.clone();
                let enable = enable.clone();
                async move {
                    match on_private_manage(&gateway, &catalog, &enable, &admins, &event).await {
                        Ok(reply) => Ok(reply),
                        Err(e) => {
                            warn!(error = %e, "Private management command failed");
                            Ok(None)
                        }
                    }
                }
            });
        }

        // Group invites become pending tickets.
        {
            let gateway = Arc::clone(&ctx.gateway);
            let requests = Arc::clone(&self.requests);
            let admins = self.admins.clone();
            bus.register_request(vec![group_invite_filter()], move |event: RequestEvent| {
                let gateway = Arc::clone(&gateway);
                let requests = Arc::clone(&requests);
                let admins = admins.clone();
                async move { on_invite(&gateway, &requests, &admins, event).await }
            });
        }

        // Group-number probe for admins.
        bus.register_message(
            vec![filters::at_me(), self.admin_filter()],
            |event: MessageEvent| async move {
                if event.message.trim() == "群号" {
                    Ok(event.group_id.map(|group_id| format!("群号: {group_id}")))
                } else {
                    Ok(None)
                }
            },
        );

        // In-group module management for group admins.
        {
            let gateway = Arc::clone(&ctx.gateway);
            let catalog = ctx.catalog.clone();
            let admins = self.admins.clone();
            bus.register_message(
                vec![filters::group(), filters::at_me()],
                move |event: MessageEvent| {
                    let gateway = Arc::clone(&gateway);
                    let catalog = catalog.clone();
                    let admins = admins.clone();
                    let enable = enable.clone();
                    async move {
                        match on_group_manage(&gateway, &catalog, &enable, &admins, &event).await {
                            Ok(reply) => Ok(reply),
                            Err(e) => {
                                warn!(error = %e, "Group management command failed");
                                Ok(None)
                            }
                        }
                    }
                },
            );
        }

        Ok(())
    }

    fn help(&self, event: &MessageEvent) -> String {
        if event.is_private() {
            "直接邀请机器人进群, 经过管理员审核后会加入.
以 '*' 开头的指令需要该群管理员权限 输入以下指令进行管理(不需输入花括号):
  列出模块 {QQ群号}
* 关闭模块 {QQ群号} {模块ID}
* 开启模块 {QQ群号} {模块ID}"
                .to_owned()
        } else {
            "管理员可使用的指令:
列出模块
关闭模块 模块ID
开启模块 模块ID"
                .to_owned()
        }
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

// ─── Module gate ──────────────────────────────────────────────────────────────

/// Installs the enable/disable gate.  A second installation (two admin
/// modules registered) is a configuration error and fails module init.
fn install_gate(ctx: &ModuleContext, enable: Storage) -> Result<(), ModuleError> {
    ctx.bus.install_module_gate(Arc::new(move |event, filter_ctx| {
        let Some(message) = event.as_message_mut() else {
            return FilterResult::Pass;
        };
        let Some(group_id) = message.group_id.filter(|_| message.is_group()) else {
            // Private chats bypass per-group gating.
            return FilterResult::Pass;
        };
        FilterResult::from_bool(is_module_enabled(&enable, group_id, filter_ctx.module()))
    }))?;
    Ok(())
}

/// Looks up the persisted override for (module, group), falling back to the
/// module's default-enabled flag.
fn is_module_enabled(enable: &Storage, group_id: i64, module: &ModuleInfo) -> bool {
    enable
        .get::<HashMap<String, bool>>(&module.id)
        .and_then(|overrides| overrides.get(&group_id.to_string()).copied())
        .unwrap_or(module.default_enabled)
}

fn set_module_enabled(
    enable: &Storage,
    catalog: &ModuleCatalog,
    group_id: i64,
    module_id: &str,
    value: bool,
) -> String {
    if !catalog.contains(module_id) {
        return "模块ID错误, 请确定ID是全英文字符".to_owned();
    }
    let mut overrides = enable
        .get::<HashMap<String, bool>>(module_id)
        .unwrap_or_default();
    overrides.insert(group_id.to_string(), value);
    enable.set(module_id, &overrides);
    format!("{} {} 成功", if value { "开启" } else { "关闭" }, module_id)
}

fn list_modules(enable: &Storage, catalog: &ModuleCatalog, group_id: i64) -> String {
    let mut out = vec!["ID  名称  是否开启".to_owned()];
    for module in catalog.iter() {
        if module.name.is_empty() {
            continue;
        }
        let state = if is_module_enabled(enable, group_id, module) {
            "已开启"
        } else {
            "已关闭"
        };
        out.push(format!("{}  {}  {}", module.id, module.name, state));
    }
    out.join("\n")
}

// ─── Pending request queue ────────────────────────────────────────────────────

fn group_invite_filter() -> RequestFilter {
    Arc::new(|event, _| {
        FilterResult::from_bool(
            event.request_type == RequestType::Group
                && event.sub_type == Some(RequestSubType::Invite),
        )
    })
}

async fn on_invite(
    gateway: &BoxedGateway,
    requests: &Arc<Mutex<HashMap<u32, PendingInvite>>>,
    admins: &[i64],
    event: RequestEvent,
) -> Result<(), BoxError> {
    info!(
        user = event.user_id,
        group = ?event.group_id,
        "Group invite received"
    );

    let ticket = {
        let mut map = requests.lock();
        let ticket = (1..).find(|id| !map.contains_key(id)).unwrap_or(u32::MAX);
        map.insert(
            ticket,
            PendingInvite {
                expires_at: Instant::now() + REQUEST_TIMEOUT,
                event: event.clone(),
            },
        );
        ticket
    };

    let announcement = format!(
        "QQ: {} 邀请 {} 进群 {} 回复 \"同意{}\" 接受邀请, {}超时",
        event.user_id,
        event.self_id,
        event.group_id.unwrap_or_default(),
        ticket,
        REQUEST_TIMEOUT_LABEL
    );
    for &admin in admins {
        gateway.send_private(admin, &announcement).await?;
    }
    Ok(())
}

async fn answer_request(
    gateway: &BoxedGateway,
    event: &RequestEvent,
    approve: bool,
    reason: Option<&str>,
) -> Result<(), BoxError> {
    let mut params = json!({
        "flag": event.flag,
        "approve": approve,
    });
    if let Some(sub_type) = event.sub_type {
        params["sub_type"] = serde_json::to_value(sub_type)?;
    }
    if let Some(reason) = reason {
        params["reason"] = json!(reason);
    }
    gateway.call_api("set_group_add_request", params).await?;
    Ok(())
}

async fn on_admin_command(
    gateway: &BoxedGateway,
    requests: &Arc<Mutex<HashMap<u32, PendingInvite>>>,
    shutdown: &CancellationToken,
    event: &MessageEvent,
) -> Result<Option<String>, BoxError> {
    let message = event.message.as_str();

    if message == "exit" {
        info!(admin = event.user_id, "Shutdown requested over chat");
        shutdown.cancel();
        return Ok(None);
    }

    if let Some(rest) = message.strip_prefix("同意") {
        let Ok(ticket) = rest.trim().parse::<u32>() else {
            return Ok(None);
        };
        let Some(pending) = requests.lock().remove(&ticket) else {
            return Ok(Some("未找到ID, 可能已经同意或超时".to_owned()));
        };
        if pending.expires_at < Instant::now() {
            return Ok(Some("该请求已超时".to_owned()));
        }
        answer_request(gateway, &pending.event, true, None).await?;
        return Ok(Some("已接受".to_owned()));
    }

    if let Some(rest) = message.strip_prefix("拒绝") {
        let mut parts = rest.trim().splitn(2, char::is_whitespace);
        let Some(Ok(ticket)) = parts.next().map(str::parse::<u32>) else {
            return Ok(None);
        };
        let Some(reason) = parts.next().map(str::trim).filter(|r| !r.is_empty()) else {
            return Ok(Some("请输入拒绝理由".to_owned()));
        };
        let Some(pending) = requests.lock().remove(&ticket) else {
            return Ok(Some("未找到ID, 可能已经同意或超时".to_owned()));
        };
        if pending.expires_at < Instant::now() {
            return Ok(Some("该请求已超时".to_owned()));
        }
        answer_request(gateway, &pending.event, false, Some(reason)).await?;
        return Ok(Some("已拒绝".to_owned()));
    }

    if let Some(rest) = message.strip_prefix("详情") {
        let Ok(ticket) = rest.trim().parse::<u32>() else {
            return Ok(None);
        };
        let group_id = {
            let map = requests.lock();
            let Some(pending) = map.get(&ticket) else {
                return Ok(Some("未找到ID, 可能已经同意或超时".to_owned()));
            };
            pending.event.group_id
        };
        let detail = gateway
            .call_api("_get_group_info", json!({ "group_id": group_id }))
            .await?;
        return Ok(Some(serde_json::to_string_pretty(&detail)?));
    }

    Ok(None)
}

// ─── Role checks ──────────────────────────────────────────────────────────────

async fn group_role(
    gateway: &BoxedGateway,
    group_id: i64,
    user_id: i64,
) -> Result<String, BoxError> {
    let response = gateway
        .call_api(
            "get_group_member_info",
            json!({ "group_id": group_id, "user_id": user_id }),
        )
        .await?;
    if response.get("retcode").and_then(Value::as_i64) != Some(0) {
        return Err("获取群信息失败, 请检查群号码".into());
    }
    Ok(response
        .pointer("/data/role")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned())
}

async fn is_group_admin(
    gateway: &BoxedGateway,
    admins: &[i64],
    group_id: i64,
    user_id: i64,
) -> Result<bool, BoxError> {
    if admins.contains(&user_id) {
        return Ok(true);
    }
    let role = group_role(gateway, group_id, user_id).await?;
    Ok(role == "owner" || role == "admin")
}

async fn is_group_member(
    gateway: &BoxedGateway,
    admins: &[i64],
    group_id: i64,
    user_id: i64,
) -> Result<bool, BoxError> {
    if admins.contains(&user_id) {
        return Ok(true);
    }
    let role = group_role(gateway, group_id, user_id).await?;
    Ok(role == "owner" || role == "admin" || role == "member")
}

// ─── Management commands ──────────────────────────────────────────────────────

async fn on_private_manage(
    gateway: &BoxedGateway,
    catalog: &ModuleCatalog,
    enable: &Storage,
    admins: &[i64],
    event: &MessageEvent,
) -> Result<Option<String>, BoxError> {
    let message = event.message.as_str();

    if let Some(rest) = message.strip_prefix("列出模块") {
        let Ok(group_id) = rest.trim().parse::<i64>() else {
            return Ok(None);
        };
        if !is_group_member(gateway, admins, group_id, event.user_id).await? {
            return Ok(Some("你还不是该群成员".to_owned()));
        }
        return Ok(Some(list_modules(enable, catalog, group_id)));
    }

    for (command, value) in [("开启模块", true), ("关闭模块", false)] {
        let Some(rest) = message.strip_prefix(command) else {
            continue;
        };
        let mut args = rest.split_whitespace();
        let (Some(Ok(group_id)), Some(module_id)) =
            (args.next().map(str::parse::<i64>), args.next())
        else {
            return Ok(None);
        };
        if !is_group_admin(gateway, admins, group_id, event.user_id).await? {
            return Ok(Some("你没有权限(该群管理员权限)".to_owned()));
        }
        return Ok(Some(set_module_enabled(
            enable, catalog, group_id, module_id, value,
        )));
    }

    Ok(None)
}

async fn on_group_manage(
    gateway: &BoxedGateway,
    catalog: &ModuleCatalog,
    enable: &Storage,
    admins: &[i64],
    event: &MessageEvent,
) -> Result<Option<String>, BoxError> {
    let Some(group_id) = event.group_id else {
        return Ok(None);
    };
    let mut parts = event.message.trim().split_whitespace();
    let (Some(command), argument) = (parts.next(), parts.next()) else {
        return Ok(None);
    };

    if !is_group_admin(gateway, admins, group_id, event.user_id).await? {
        return Ok(None);
    }

    match (command, argument) {
        ("列出模块", _) => Ok(Some(list_modules(enable, catalog, group_id))),
        ("关闭模块", Some(module_id)) => Ok(Some(set_module_enabled(
            enable, catalog, group_id, module_id, false,
        ))),
        ("开启模块", Some(module_id)) => Ok(Some(set_module_enabled(
            enable, catalog, group_id, module_id, true,
        ))),
        _ => Ok(None),
    }
}
