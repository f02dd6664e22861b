//! Local groups and their members.

use super::{Collector, HostEnumerator};
use crate::error::Result;
use crate::record::MemberRecord;
use crate::staging::Store;
use crate::types::PrincipalKind;
use tracing::info;

pub(super) fn collect_groups(c: &Collector<'_>, host: &dyn HostEnumerator) -> Result<()> {
    let groups = host.local_groups()?;
    info!(groups = groups.len(), "collecting group membership");

    // Every group name is claimed as a group before any member is staged,
    // so nested groups never land as users.
    let mut staged = Vec::with_capacity(groups.len());
    for group in &groups {
        c.count_examined();
        match c.stage_principal(&group.name, PrincipalKind::Group, None) {
            Ok(id) => staged.push((group, id)),
            Err(e) => c.skip(&group.name, e),
        }
    }

    for (group, group_id) in staged {
        for member in &group.members {
            let outcome = c
                .stage_principal(member, PrincipalKind::User, Some(group_id))
                .and_then(|member| {
                    c.staging.append(
                        Store::Members,
                        &MemberRecord {
                            member,
                            group: group_id,
                        },
                    )
                });
            if let Err(e) = outcome {
                c.skip(member, e);
            }
        }
    }
    Ok(())
}
