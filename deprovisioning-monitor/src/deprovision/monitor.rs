/*!
The deprovisioning workflow: discover disabled accounts, strip their attributes,
schedule their removal and report them to the administrator
*/

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::deprovision::config::MonitorConfig;
use crate::deprovision::error::{MonitorError, Result};
use crate::deprovision::identity::{EntityOperation, IdentityApi};
use crate::deprovision::notifier::{
    build_report, render_report, Attachment, Notification, Notifier, REPORT_FILENAME,
};
use crate::deprovision::user::User;

/// Runs one deprovisioning pass against the identity system.
///
/// Holds no state between runs: every call to [`DeprovisioningMonitor::run`]
/// re-reads the group and re-evaluates each member.
pub struct DeprovisioningMonitor<'a> {
    config: &'a MonitorConfig,
    api: &'a dyn IdentityApi,
    notifier: &'a dyn Notifier,
}

impl<'a> DeprovisioningMonitor<'a> {
    pub fn new(
        config: &'a MonitorConfig,
        api: &'a dyn IdentityApi,
        notifier: &'a dyn Notifier,
    ) -> Self {
        Self { config, api, notifier }
    }

    /// Execute the full workflow. The first error aborts the run.
    pub async fn run(&self) -> Result<()> {
        if self.config.dry_run {
            info!("Dry run: no attribute, schedule or email changes will be made");
        }

        let users = self.discover_users().await?;
        info!("🔍 Found {} account(s) to deprovision", users.len());

        for user in &users {
            self.remove_user_attrs(user).await?;
            self.schedule_user_removal(user).await?;
        }

        if !users.is_empty() {
            self.send_notification(&users).await?;
        }

        info!("🏁 Deprovisioning run finished");
        Ok(())
    }

    /// Disabled group members that are not already scheduled for removal,
    /// in membership order
    async fn discover_users(&self) -> Result<Vec<User>> {
        let group = self.api.get_group().await?;
        debug!("Group has {} member(s)", group.members.len());

        let mut users = Vec::new();
        for member_id in group.members {
            let entity = self.api.get_entity(member_id).await?;
            if let Some(user) = User::from_entity(member_id, &entity) {
                debug!("Entity '{}' selected (shared id: {:?})", member_id, user.shared_id);
                users.push(user);
            }
        }
        Ok(users)
    }

    async fn remove_user_attrs(&self, user: &User) -> Result<()> {
        let attrs = self.api.get_entity_attrs(user.internal_id, false).await?;
        for attr in attrs {
            let Some(name) = attr.name.as_deref() else {
                continue;
            };
            if self.config.attr_whitelist.contains(name) || !attr.is_fully_visible() {
                continue;
            }

            debug!("removing attribute '{}' from entity '{}'", name, user.internal_id);
            if !self.config.dry_run {
                self.api.remove_entity_attr(user.internal_id, name).await?;
            }
        }
        Ok(())
    }

    async fn schedule_user_removal(&self, user: &User) -> Result<()> {
        let when = removal_time(Utc::now(), self.config.retention_period)?;
        debug!("scheduling removal of entity '{}' at '{}'", user.internal_id, when);
        if !self.config.dry_run {
            self.api
                .schedule_operation(user.internal_id, EntityOperation::Remove, when)
                .await?;
        }
        Ok(())
    }

    async fn send_notification(&self, users: &[User]) -> Result<()> {
        let report = build_report(users);
        if report.is_empty() {
            debug!("No deprovisioned account has a persistent identity, skipping notification");
            return Ok(());
        }

        let attachment = Attachment {
            filename: REPORT_FILENAME.to_string(),
            message: render_report(&report)?,
        };
        let notification =
            Notification::from_config(&self.config.notifications.email, vec![attachment]);

        debug!(
            "sending {} notification from address '{}' to '{:?}' with subject '{}' \
             and attachment {}:\n{}",
            self.notifier.name(),
            notification.from,
            notification.to,
            notification.subject,
            REPORT_FILENAME,
            notification.attachments[0].message
        );
        if !self.config.dry_run {
            self.notifier.send(&notification).await?;
        }
        Ok(())
    }
}

/// `now` plus the retention period in days
pub fn removal_time(now: DateTime<Utc>, retention_days: u32) -> Result<DateTime<Utc>> {
    now.checked_add_signed(Duration::days(i64::from(retention_days)))
        .ok_or_else(|| MonitorError::ConfigValue {
            key: "retention_period",
            reason: format!("{retention_days} days is out of range"),
        })
}

/// Run a single deprovisioning pass
pub async fn run(
    config: &MonitorConfig,
    api: &dyn IdentityApi,
    notifier: &dyn Notifier,
) -> Result<()> {
    DeprovisioningMonitor::new(config, api, notifier).run().await
}
