//! Runs a validated [`BootstrapPlan`] against the guest.

use crate::GuestIdentity;
use crate::binfmt;
use crate::devices;
use crate::env::{self, GuestEnvironment};
use crate::error::GuestError;
use crate::layout::GuestLayout;
use crate::net;
use crate::plan::{BootstrapPlan, Step};
use crate::privilege::{self, Credentials};

pub struct Bootstrapper<'a, C: Credentials> {
    layout: &'a GuestLayout,
    identity: &'a GuestIdentity,
    credentials: C,
}

impl<'a, C: Credentials> Bootstrapper<'a, C> {
    pub fn new(layout: &'a GuestLayout, identity: &'a GuestIdentity, credentials: C) -> Self {
        Self {
            layout,
            identity,
            credentials,
        }
    }

    /// Execute every step of `plan` in order.
    ///
    /// Nothing runs unless the plan validates. Fatal steps stop the run;
    /// best-effort steps log and continue.
    pub fn run(&mut self, plan: &BootstrapPlan) -> Result<GuestEnvironment, GuestError> {
        plan.validate()?;

        let mut environment = GuestEnvironment::default();
        for &step in plan.steps() {
            let span = tracing::info_span!("step", name = step.name());
            let _enter = span.enter();

            match self.run_step(step, &mut environment) {
                Ok(()) => tracing::debug!("step complete"),
                Err(e) if step.is_fatal() => {
                    tracing::error!(error = %e, "step failed");
                    return Err(e);
                }
                Err(e) => tracing::warn!(error = %e, "step failed, continuing"),
            }
        }

        Ok(environment)
    }

    fn run_step(
        &mut self,
        step: Step,
        environment: &mut GuestEnvironment,
    ) -> Result<(), GuestError> {
        match step {
            Step::MountFilesystems => kroot_mount::mount_all(&self.layout.mounts)?,
            Step::RegisterBinfmt => {
                binfmt::register_interpreter(self.layout)?;
            }
            Step::ConfigureNetwork => net::configure_network(self.layout)?,
            Step::FixDeviceOwnership => {
                devices::fix_device_ownership(
                    &self.layout.device_dirs,
                    self.identity.uid,
                    self.identity.gid,
                );
            }
            Step::DropPrivileges => {
                privilege::drop_privileges(&mut self.credentials, self.identity)?
            }
            Step::PrepareEnvironment => {
                *environment = env::prepare_environment(self.layout, self.identity);
            }
        }
        Ok(())
    }

    pub fn into_credentials(self) -> C {
        self.credentials
    }
}
