//! Runner universes: services, tasks, autoruns, processes.

use super::{Collector, HostEnumerator};
use crate::error::Result;
use crate::normalize::{self, SYSTEM};
use crate::record::RunnerRecord;
use crate::staging::Store;
use crate::types::{NodeKind, PrincipalKind, RunnerKind};
use tracing::{debug, info};

/// Context of autoruns that fire at any interactive logon.
const INTERACTIVE: &str = r"nt authority\interactive";

/// What is known about one runner before staging.
struct RunnerSpec<'s> {
    kind: RunnerKind,
    name: &'s str,
    exe: &'s str,
    args: &'s str,
    context: &'s str,
    run_level: Option<&'s str>,
}

pub(super) fn collect_services(c: &Collector<'_>, host: &dyn HostEnumerator) -> Result<()> {
    let services = host.services()?;
    info!(services = services.len(), "collecting services");
    for service in services {
        let (exe, args) = normalize::split_command_line(&service.command_line);
        let context = if service.start_name.trim().is_empty() {
            SYSTEM
        } else {
            service.start_name.as_str()
        };
        stage_or_skip(
            c,
            RunnerSpec {
                kind: RunnerKind::Service,
                name: &service.name,
                exe: &exe,
                args: &args,
                context,
                run_level: None,
            },
        );
    }
    Ok(())
}

pub(super) fn collect_tasks(c: &Collector<'_>, host: &dyn HostEnumerator) -> Result<()> {
    let tasks = host.tasks()?;
    info!(tasks = tasks.len(), "collecting scheduled tasks");
    for task in tasks {
        if !task.enabled {
            debug!(task = %task.name, "disabled task skipped");
            continue;
        }
        let context = if task.context.trim().is_empty() {
            SYSTEM
        } else {
            task.context.as_str()
        };
        stage_or_skip(
            c,
            RunnerSpec {
                kind: RunnerKind::Task,
                name: &task.name,
                exe: &task.path,
                args: &task.args,
                context,
                run_level: task.run_level.as_deref(),
            },
        );
    }
    Ok(())
}

pub(super) fn collect_autoruns(c: &Collector<'_>, host: &dyn HostEnumerator) -> Result<()> {
    let autoruns = host.autoruns()?;
    info!(autoruns = autoruns.len(), "collecting autoruns");
    for autorun in autoruns {
        let (exe, args) = normalize::split_command_line(&autorun.command_line);
        let context = if autorun.context.trim().is_empty() {
            INTERACTIVE
        } else {
            autorun.context.as_str()
        };
        stage_or_skip(
            c,
            RunnerSpec {
                kind: RunnerKind::Autorun,
                name: &autorun.name,
                exe: &exe,
                args: &args,
                context,
                run_level: None,
            },
        );
    }
    Ok(())
}

pub(super) fn collect_processes(c: &Collector<'_>, host: &dyn HostEnumerator) -> Result<()> {
    let processes = host.processes()?;
    info!(processes = processes.len(), "collecting processes");
    for process in processes {
        let name = format!("{}:{}", process.pid, process.name);
        stage_or_skip(
            c,
            RunnerSpec {
                kind: RunnerKind::Process,
                name: &name,
                exe: &process.exe_path,
                args: "",
                context: &process.owner,
                run_level: None,
            },
        );
    }
    Ok(())
}

fn stage_or_skip(c: &Collector<'_>, spec: RunnerSpec<'_>) {
    c.count_examined();
    if spec.exe.trim().trim_matches('"').trim().is_empty() {
        c.skip(spec.name, "no executable path");
        return;
    }
    if spec.context.trim().is_empty() {
        c.skip(spec.name, "no executing principal");
        return;
    }
    if let Err(e) = stage_runner(c, &spec) {
        c.skip(spec.name, e);
    }
}

/// Stages the runner, its target executable, the executable's directory
/// chain, and the executing principal.
fn stage_runner(c: &Collector<'_>, spec: &RunnerSpec<'_>) -> Result<()> {
    let name = normalize::normalize_name(&format!("{}:{}", spec.kind.as_str(), spec.name));
    let nid = c.ident.identify(&name);
    if !c.staged.try_claim(NodeKind::Runner, nid) {
        debug!(runner = %name, "runner already staged");
        return Ok(());
    }

    let exe_fs = normalize::fs_path(spec.exe);
    let exe_path = normalize::normalize_path(spec.exe);
    let exe = c.ident.identify(&exe_path);

    let exe_parent = match (normalize::parent_of(&exe_path), exe_fs.parent()) {
        (Some(parent), Some(parent_fs)) => Some(c.stage_directory(&parent, parent_fs)?),
        _ => None,
    };
    if c.staged.try_claim(NodeKind::Exe, exe) {
        c.stage_securable(NodeKind::Exe, &exe_path, &exe_fs, exe, None)?;
    }

    let context_name = normalize::canonical_principal(spec.context);
    let context = c.stage_principal(&context_name, PrincipalKind::Unknown, None)?;

    c.staging.append(
        Store::Runners,
        &RunnerRecord {
            nid,
            name,
            kind: spec.kind,
            args: spec.args.to_string(),
            exe_path,
            exe,
            exe_parent,
            context_name,
            context,
            run_level: spec.run_level.map(|l| l.trim().to_lowercase()),
        },
    )
}
