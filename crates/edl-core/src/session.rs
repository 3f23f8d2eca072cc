//! Device session - high-level orchestrator for mode transitions and
//! the EDL flashing flow.
//!
//! The session owns the believed device mode and the active EDL port.
//! Transitions are requested, never assumed: every reboot command is
//! followed by a poll that confirms arrival before the handle is used.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use tracing::{info, instrument, warn};

use crate::config::ToolboxConfig;
use crate::error::Result;
use crate::events::{EdlEvent, EdlObserver, EdlPhase, LogLevel, TracingObserver};
use crate::exec::{CommandRunner, HostRunner, Invocation};
use crate::firehose::{FirehoseExecutor, FlashPlan, PartitionTarget};
use crate::mode::{DeviceMode, EdlHandle, SlotSuffix};
use crate::poll::{CancelToken, wait_until};
use crate::prompt::{OperatorPrompt, StdinPrompt};
use crate::sahara::SaharaLoader;
use crate::scan::{PortScanner, SerialScanner};

/// Orchestrates the device through ADB, Fastboot and EDL.
///
/// Generic over its four seams so tests can script every external
/// effect: process execution, port enumeration, operator interaction
/// and event delivery.
pub struct DeviceSession<R: CommandRunner, S: PortScanner, P: OperatorPrompt, O: EdlObserver> {
    config: ToolboxConfig,
    runner: R,
    scanner: S,
    prompt: P,
    observer: Arc<O>,
    cancel: CancelToken,
    /// Port of the last confirmed EDL arrival. Cleared by every reboot.
    edl_port: Option<EdlHandle>,
    phase: EdlPhase,
}

impl DeviceSession<HostRunner, SerialScanner, StdinPrompt, TracingObserver> {
    /// Create a session wired to the real host: subprocesses, serial
    /// enumeration, stdin prompts and tracing output.
    pub fn new(config: ToolboxConfig) -> Self {
        Self::with_parts(
            config,
            HostRunner::new(),
            SerialScanner::new(),
            StdinPrompt,
            Arc::new(TracingObserver),
        )
    }
}

impl<R, S, P, O> DeviceSession<R, S, P, O>
where
    R: CommandRunner,
    S: PortScanner,
    P: OperatorPrompt,
    O: EdlObserver + 'static,
{
    /// Create a session from explicit parts.
    pub fn with_parts(
        config: ToolboxConfig,
        runner: R,
        scanner: S,
        prompt: P,
        observer: Arc<O>,
    ) -> Self {
        Self {
            config,
            runner,
            scanner,
            prompt,
            observer,
            cancel: CancelToken::new(),
            edl_port: None,
            phase: EdlPhase::WaitingForDevice,
        }
    }

    pub fn config(&self) -> &ToolboxConfig {
        &self.config
    }

    /// Last confirmed EDL handle, if the device has not been rebooted
    /// since it was acquired.
    pub fn edl_port(&self) -> Option<&EdlHandle> {
        self.edl_port.as_ref()
    }

    /// Token that aborts any in-progress wait when cancelled. Clone it
    /// into a Ctrl+C handler.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Sahara stage bound to this session's runner and config.
    pub fn sahara(&self) -> SaharaLoader<'_, R> {
        SaharaLoader::new(&self.runner, &self.config)
    }

    /// Firehose stage bound to this session's runner and config.
    pub fn firehose(&self) -> FirehoseExecutor<'_, R> {
        FirehoseExecutor::new(&self.runner, &self.config)
    }

    fn emit(&self, event: EdlEvent) {
        self.observer.on_event(&event);
    }

    fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.emit(EdlEvent::Log {
            level,
            message: message.into(),
        });
    }

    fn goto_phase(&mut self, to: EdlPhase) {
        if self.phase != to {
            info!(from = %self.phase, to = %to, "Phase transition");
            self.emit(EdlEvent::PhaseChanged {
                from: self.phase,
                to,
            });
            self.phase = to;
        }
    }

    /// Run a flow and publish its terminal phase: Complete on success,
    /// Error with the failure text before it propagates.
    fn complete_flow(&mut self, flow: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
        match flow(self) {
            Ok(()) => {
                self.goto_phase(EdlPhase::Complete);
                self.emit(EdlEvent::Complete);
                Ok(())
            }
            Err(e) => {
                self.goto_phase(EdlPhase::Error);
                self.emit(EdlEvent::Error {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn adb(&self) -> Invocation {
        self.config.tool_invocation(self.config.adb_exe())
    }

    fn fastboot(&self) -> Invocation {
        self.config.tool_invocation(self.config.fastboot_exe())
    }

    /// Let the device settle after a reboot command before polling.
    fn settle(&self) {
        let delay = self.config.settle_delay();
        if !delay.is_zero() {
            info!(secs = delay.as_secs(), "Letting the device settle");
            thread::sleep(delay);
        }
    }

    /// Block until an ADB device is present.
    ///
    /// In skip-ADB mode this is a no-op; the operator vouches for the
    /// device state.
    pub fn wait_for_adb(&self) -> Result<()> {
        if self.config.skip_adb {
            info!("ADB transitions disabled, assuming the device is ready");
            return Ok(());
        }
        info!("Waiting for an ADB device...");
        let invocation = self.adb().arg("wait-for-device");
        self.runner.run(&invocation)?;
        self.emit(EdlEvent::DeviceDetected {
            mode: DeviceMode::Normal,
            port: None,
        });
        Ok(())
    }

    /// Device model string, if the device is up and authorized.
    ///
    /// Blocks until an ADB device is present before querying.
    pub fn device_model(&self) -> Option<String> {
        if self.config.skip_adb {
            return None;
        }
        if let Err(e) = self.wait_for_adb() {
            warn!(error = %e, "No ADB device arrived");
            return None;
        }
        let invocation = self.adb().arg("shell").arg("getprop").arg("ro.product.model");
        match self.runner.run_captured(&invocation) {
            Ok(output) => {
                let model = output.stdout.trim().to_string();
                if model.is_empty() {
                    warn!("Empty device model, is the device authorized?");
                    None
                } else {
                    Some(model)
                }
            }
            Err(e) => {
                warn!(error = %e, "Could not read the device model");
                None
            }
        }
    }

    /// Active A/B slot as reported by the booted system. Waits for the
    /// ADB device first.
    pub fn active_slot(&self) -> Option<SlotSuffix> {
        if self.config.skip_adb {
            return None;
        }
        if let Err(e) = self.wait_for_adb() {
            warn!(error = %e, "No ADB device arrived");
            return None;
        }
        let invocation = self
            .adb()
            .arg("shell")
            .arg("getprop")
            .arg("ro.boot.slot_suffix");
        match self.runner.run_captured(&invocation) {
            Ok(output) => SlotSuffix::parse(&output.stdout),
            Err(e) => {
                warn!(error = %e, "Could not read the active slot over ADB");
                None
            }
        }
    }

    /// Active A/B slot as reported by the bootloader.
    ///
    /// fastboot prints variables on stderr on most hosts, stdout on
    /// some; the value is scraped from both streams.
    pub fn active_slot_from_fastboot(&self) -> Option<SlotSuffix> {
        let invocation = self.fastboot().arg("getvar").arg("current-slot");
        let output = match self.runner.run_captured_unchecked(&invocation) {
            Ok(output) => output,
            Err(e) => {
                warn!(error = %e, "Could not query the current slot over fastboot");
                return None;
            }
        };

        let combined = format!("{}\n{}", output.stderr.trim(), output.stdout.trim());
        for line in combined.lines() {
            if let Some(idx) = line.find("current-slot:") {
                let rest = &line[idx + "current-slot:".len()..];
                let value = rest.split_whitespace().next().unwrap_or("");
                return SlotSuffix::parse(value);
            }
        }
        warn!(
            reply = %combined.lines().next().unwrap_or(""),
            "No current-slot in the fastboot reply"
        );
        None
    }

    /// Request a reboot into EDL mode.
    ///
    /// The reboot command is fire-and-forget: some devices drop the ADB
    /// link before acknowledging, so a send failure only warns and the
    /// operator can reboot by hand. Arrival is confirmed separately.
    pub fn reboot_to_edl(&mut self) -> Result<()> {
        self.edl_port = None;
        if self.config.skip_adb {
            info!("ADB transitions disabled, reboot the device into EDL mode manually");
            self.log(
                LogLevel::Info,
                "Reboot the device into EDL mode manually (power + volume keys, or a test point)",
            );
            return Ok(());
        }
        self.wait_for_adb()?;
        self.emit(EdlEvent::RebootRequested {
            target: DeviceMode::Edl,
        });
        let invocation = self.adb().arg("reboot").arg("edl");
        if let Err(e) = self.runner.run(&invocation) {
            warn!(error = %e, "Reboot command failed, reboot the device into EDL mode manually");
        }
        Ok(())
    }

    /// Request a reboot into the bootloader. Unlike the EDL path a send
    /// failure is propagated; fastboot work cannot proceed without it.
    pub fn reboot_to_bootloader(&mut self) -> Result<()> {
        self.edl_port = None;
        self.wait_for_adb()?;
        self.emit(EdlEvent::RebootRequested {
            target: DeviceMode::Bootloader,
        });
        let invocation = self.adb().arg("reboot").arg("bootloader");
        self.runner.run(&invocation)?;
        Ok(())
    }

    /// Reboot out of the bootloader back to the normal system,
    /// best-effort.
    pub fn fastboot_reboot_system(&mut self) {
        self.edl_port = None;
        self.emit(EdlEvent::RebootRequested {
            target: DeviceMode::Normal,
        });
        let invocation = self.fastboot().arg("reboot");
        if let Err(e) = self.runner.run(&invocation) {
            warn!(error = %e, "fastboot reboot failed, reboot the device manually");
        }
    }

    /// Leave fastboot after a variable round-trip: reboot back to the
    /// normal system, or tell the operator the device stays put when
    /// transitions are manual.
    fn leave_fastboot(&mut self) {
        if self.config.skip_adb {
            warn!("Device left in fastboot mode, reboot it manually");
            self.log(
                LogLevel::Warn,
                "Device left in fastboot mode, reboot it manually",
            );
        } else {
            self.fastboot_reboot_system();
        }
    }

    /// Whether any fastboot device is currently listed.
    pub fn check_fastboot_device(&self) -> bool {
        // `fastboot devices` exits zero with an empty list; presence is
        // in the output, not the exit code.
        let invocation = self.fastboot().arg("devices");
        match self.runner.run_captured_unchecked(&invocation) {
            Ok(output) => !output.stdout.trim().is_empty(),
            Err(e) => {
                warn!(error = %e, "Could not list fastboot devices");
                false
            }
        }
    }

    /// Poll until a fastboot device is listed.
    pub fn wait_for_fastboot(&self) -> Result<()> {
        info!("Waiting for a fastboot device...");
        let mut attempts: u64 = 0;
        wait_until(
            "fastboot device",
            || {
                if self.check_fastboot_device() {
                    Some(())
                } else {
                    attempts += 1;
                    self.emit(EdlEvent::Polling {
                        target: DeviceMode::Bootloader,
                        attempts,
                    });
                    None
                }
            },
            self.config.poll_interval(),
            &self.cancel,
        )?;
        self.emit(EdlEvent::DeviceDetected {
            mode: DeviceMode::Bootloader,
            port: None,
        });
        Ok(())
    }

    /// Poll until an EDL port enumerates and return its handle.
    pub fn wait_for_edl(&self) -> Result<EdlHandle> {
        info!("Waiting for an EDL (9008) port...");
        let mut attempts: u64 = 0;
        let port = wait_until(
            "EDL port",
            || {
                let found = self.scanner.find_edl_port();
                if found.is_none() {
                    attempts += 1;
                    self.emit(EdlEvent::Polling {
                        target: DeviceMode::Edl,
                        attempts,
                    });
                }
                found
            },
            self.config.poll_interval(),
            &self.cancel,
        )?;
        let handle = EdlHandle::new(port);
        info!(port = %handle, "EDL device detected");
        self.emit(EdlEvent::DeviceDetected {
            mode: DeviceMode::Edl,
            port: Some(handle.port().to_string()),
        });
        Ok(handle)
    }

    /// Gate on the Firehose programmer being staged in the image
    /// directory. Re-prompts until the file appears.
    pub fn wait_for_loader_file(&self) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.config.image_dir)?;
        let loader = self.config.loader_file();
        while !loader.exists() {
            self.prompt.await_confirmation(&format!(
                "Place the EDL loader '{}' into '{}' to continue.",
                self.config.loader_filename,
                self.config.image_dir.display()
            ))?;
        }
        Ok(loader)
    }

    /// Get the device into EDL mode and return the confirmed port.
    ///
    /// Idempotent: a device already enumerated in EDL skips the reboot
    /// path entirely. Otherwise the device is rebooted over ADB (or the
    /// operator is asked to do it) and the port is awaited.
    #[instrument(skip(self))]
    pub fn setup_edl_connection(&mut self) -> Result<EdlHandle> {
        self.goto_phase(EdlPhase::EdlSetup);

        if let Some(port) = self.scanner.find_edl_port() {
            info!(port = %port, "Device is already in EDL mode, skipping the reboot");
        } else {
            self.reboot_to_edl()?;
            if !self.config.skip_adb {
                self.settle();
            }
        }

        let loader = self.wait_for_loader_file()?;
        info!(loader = %loader.display(), "Loader file is staged");

        self.goto_phase(EdlPhase::WaitingForDevice);
        let handle = self.wait_for_edl()?;
        self.edl_port = Some(handle.clone());
        Ok(handle)
    }

    /// Full fastboot variable round-trip for rollback-index auditing.
    ///
    /// Reboots to the bootloader, captures `fastboot getvar all` from
    /// both streams and reboots back; when transitions are manual the
    /// operator is told the device stays in fastboot instead, on the
    /// failure path too. The raw text is returned verbatim; parsing is
    /// the caller's concern.
    #[instrument(skip(self))]
    pub fn fastboot_vars(&mut self) -> Result<String> {
        self.goto_phase(EdlPhase::RollbackCheck);

        if self.config.skip_adb {
            self.prompt
                .await_confirmation("Reboot the device into fastboot mode to continue.")?;
        } else {
            self.reboot_to_bootloader()?;
            self.settle();
        }

        self.wait_for_fastboot()?;

        // Locked bootloaders make getvar exit non-zero after printing
        // everything; take whatever arrived on either stream.
        let invocation = self.fastboot().arg("getvar").arg("all");
        match self.runner.run_captured_unchecked(&invocation) {
            Ok(output) => {
                let vars = format!("{}\n{}", output.stdout, output.stderr);
                self.leave_fastboot();
                Ok(vars)
            }
            Err(e) => {
                self.leave_fastboot();
                Err(e.into())
            }
        }
    }

    /// Dump one partition range: EDL setup, programmer upload, read.
    #[instrument(skip(self, target))]
    pub fn dump_partition(&mut self, output: &Path, target: &PartitionTarget) -> Result<()> {
        self.complete_flow(|s| {
            let handle = s.setup_edl_connection()?;

            s.goto_phase(EdlPhase::ProgrammerUpload);
            s.sahara().load_programmer(&s.config.loader_file(), &handle)?;

            s.goto_phase(EdlPhase::PartitionRead);
            s.firehose().read_partition(&handle, output, target)
        })
    }

    /// Flash one image: EDL setup, programmer upload, write.
    #[instrument(skip(self, target))]
    pub fn flash_partition(&mut self, image: &Path, target: &PartitionTarget) -> Result<()> {
        self.complete_flow(|s| {
            let handle = s.setup_edl_connection()?;

            s.goto_phase(EdlPhase::ProgrammerUpload);
            s.sahara().load_programmer(&s.config.loader_file(), &handle)?;

            s.goto_phase(EdlPhase::PartitionWrite);
            s.firehose().write_partition(&handle, image, target)
        })
    }

    /// Flash a full firmware package from its rawprogram/patch
    /// descriptors.
    ///
    /// fh_loader resolves descriptor names and the `filename=` entries
    /// inside them against the loader's directory, so the package must
    /// be staged next to the loader.
    #[instrument(skip(self))]
    pub fn run_flash_plan(&mut self, firmware_dir: &Path, memory_type: &str) -> Result<()> {
        self.complete_flow(|s| {
            let handle = s.setup_edl_connection()?;
            let plan =
                FlashPlan::discover(firmware_dir, s.config.loader_file(), memory_type, handle)?;

            s.goto_phase(EdlPhase::Flashing);
            s.firehose().flash_plan(&plan)
        })
    }

    /// Reset the device out of EDL back to a normal boot.
    #[instrument(skip(self))]
    pub fn reset_device(&mut self) -> Result<()> {
        self.complete_flow(|s| {
            let handle = s.setup_edl_connection()?;

            s.goto_phase(EdlPhase::DeviceReset);
            s.firehose().reset(&handle)?;
            // The port is gone once the reset lands.
            s.edl_port = None;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::error::FlashError;
    use crate::events::NullObserver;
    use crate::exec::{CommandOutput, MockRunner};
    use crate::prompt::MockPrompt;
    use crate::scan::{MockScanner, PortInfo};

    fn test_config(dir: &tempfile::TempDir) -> ToolboxConfig {
        ToolboxConfig {
            tools_dir: dir.path().join("tools"),
            download_dir: dir.path().join("tools").join("dl"),
            image_dir: dir.path().join("image"),
            poll_interval_secs: 0,
            settle_delay_secs: 0,
            ..Default::default()
        }
    }

    fn stage_loader(config: &ToolboxConfig) {
        std::fs::create_dir_all(&config.image_dir).unwrap();
        std::fs::write(config.loader_file(), b"loader").unwrap();
    }

    fn stage_vendor_tools(config: &ToolboxConfig) {
        std::fs::create_dir_all(&config.tools_dir).unwrap();
        std::fs::write(config.sahara_exe(), b"stub").unwrap();
        std::fs::write(config.fh_loader_exe(), b"stub").unwrap();
    }

    fn edl_port(name: &str) -> PortInfo {
        PortInfo::new(
            name,
            "Qualcomm HS-USB QDLoader 9008",
            "USB VID:PID=05C6:9008 SER=c0ffee",
        )
    }

    fn session_with(
        config: ToolboxConfig,
        runner: MockRunner,
        scanner: MockScanner,
        prompt: MockPrompt,
    ) -> DeviceSession<MockRunner, MockScanner, MockPrompt, NullObserver> {
        DeviceSession::with_parts(config, runner, scanner, prompt, Arc::new(NullObserver))
    }

    #[test]
    fn test_setup_skips_reboot_when_already_in_edl() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = test_config(&dir);
        stage_loader(&config);

        let runner = MockRunner::new();
        let prompt = MockPrompt::always_confirm();
        let mut session = session_with(
            config,
            runner.clone(),
            MockScanner::fixed(vec![edl_port("COM7")]),
            prompt.clone(),
        );

        let handle = session.setup_edl_connection().unwrap();
        assert_eq!(handle.port(), "COM7");
        assert_eq!(session.edl_port(), Some(&handle));
        // No ADB command and no prompt were needed.
        assert!(runner.invocations().is_empty());
        assert!(prompt.messages().is_empty());
    }

    #[test]
    fn test_setup_reboots_then_waits_for_the_port() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = test_config(&dir);
        stage_loader(&config);

        let runner = MockRunner::new();
        runner.queue_success(""); // adb wait-for-device
        runner.queue_success(""); // adb reboot edl
        // Initial check misses, one poll misses, then the port shows up.
        let scanner = MockScanner::sequence(vec![vec![], vec![], vec![edl_port("COM9")]]);
        let mut session =
            session_with(config, runner.clone(), scanner, MockPrompt::always_confirm());

        let handle = session.setup_edl_connection().unwrap();
        assert_eq!(handle.port(), "COM9");

        let log = runner.invocations();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].program_name(), "adb.exe");
        assert_eq!(log[0].args_ref(), ["wait-for-device"]);
        assert_eq!(log[1].args_ref(), ["reboot", "edl"]);
    }

    #[test]
    fn test_setup_skip_adb_never_touches_the_bridge() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = ToolboxConfig {
            skip_adb: true,
            ..test_config(&dir)
        };
        stage_loader(&config);

        let runner = MockRunner::new();
        let scanner = MockScanner::sequence(vec![vec![], vec![edl_port("COM3")]]);
        let mut session =
            session_with(config, runner.clone(), scanner, MockPrompt::always_confirm());

        session.setup_edl_connection().unwrap();
        assert!(runner.invocations().is_empty());
    }

    /// Prompt double that stages the loader file when asked, the way an
    /// operator would.
    #[derive(Clone)]
    struct StageLoaderOnPrompt {
        path: PathBuf,
        messages: Arc<Mutex<Vec<String>>>,
    }

    impl OperatorPrompt for StageLoaderOnPrompt {
        fn await_confirmation(&self, message: &str) -> std::io::Result<()> {
            self.messages.lock().unwrap().push(message.to_string());
            std::fs::write(&self.path, b"loader")?;
            Ok(())
        }
    }

    #[test]
    fn test_setup_gates_on_the_loader_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = test_config(&dir);

        let prompt = StageLoaderOnPrompt {
            path: config.loader_file(),
            messages: Arc::new(Mutex::new(Vec::new())),
        };
        let messages = prompt.messages.clone();
        let mut session = DeviceSession::with_parts(
            config.clone(),
            MockRunner::new(),
            MockScanner::fixed(vec![edl_port("COM7")]),
            prompt,
            Arc::new(crate::events::NullObserver),
        );

        session.setup_edl_connection().unwrap();

        assert!(config.loader_file().exists());
        let messages = messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("prog_firehose_ddr.elf"));
    }

    #[test]
    fn test_reboot_to_edl_swallows_the_send_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = test_config(&dir);

        let runner = MockRunner::new();
        runner.queue_success(""); // adb wait-for-device
        // Nothing queued for `adb reboot edl`: the link dropped.
        let mut session = session_with(
            config,
            runner.clone(),
            MockScanner::empty(),
            MockPrompt::always_confirm(),
        );

        session.reboot_to_edl().unwrap();
        assert!(session.edl_port().is_none());
        assert_eq!(runner.invocations().len(), 2);
    }

    #[test]
    fn test_reboot_to_bootloader_propagates_the_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = test_config(&dir);

        let runner = MockRunner::new();
        runner.queue_success(""); // adb wait-for-device
        let mut session = session_with(
            config,
            runner,
            MockScanner::empty(),
            MockPrompt::always_confirm(),
        );

        assert!(session.reboot_to_bootloader().is_err());
    }

    #[test]
    fn test_fastboot_vars_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = test_config(&dir);

        let runner = MockRunner::new();
        runner.queue_success(""); // adb wait-for-device
        runner.queue_success(""); // adb reboot bootloader
        runner.queue_success("0123456789ABCDEF\tfastboot\n"); // fastboot devices
        runner.queue_outcome(Ok(CommandOutput {
            stdout: String::new(),
            stderr: "(bootloader) anti: 4\nall: listed\n".to_string(),
            exit_code: Some(0),
        })); // fastboot getvar all
        runner.queue_success(""); // fastboot reboot

        let mut session = session_with(
            config,
            runner.clone(),
            MockScanner::empty(),
            MockPrompt::always_confirm(),
        );

        let vars = session.fastboot_vars().unwrap();
        assert!(vars.contains("(bootloader) anti: 4"));

        let log = runner.invocations();
        assert_eq!(log.len(), 5);
        assert_eq!(log[3].args_ref(), ["getvar", "all"]);
        assert_eq!(log[4].program_name(), "fastboot.exe");
        assert_eq!(log[4].args_ref(), ["reboot"]);
    }

    #[test]
    fn test_fastboot_vars_reboots_back_after_a_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = test_config(&dir);

        let runner = MockRunner::new();
        runner.queue_success(""); // adb wait-for-device
        runner.queue_success(""); // adb reboot bootloader
        runner.queue_success("0123456789ABCDEF\tfastboot\n"); // fastboot devices
        // Nothing queued for getvar all or the return reboot.

        let mut session = session_with(
            config,
            runner.clone(),
            MockScanner::empty(),
            MockPrompt::always_confirm(),
        );

        let err = session.fastboot_vars().unwrap_err();
        assert!(matches!(err, FlashError::Exec(_)));

        // The return reboot was still attempted.
        let log = runner.invocations();
        assert_eq!(log.last().unwrap().args_ref(), ["reboot"]);
    }

    #[test]
    fn test_fastboot_vars_skip_adb_never_reboots_back() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = ToolboxConfig {
            skip_adb: true,
            ..test_config(&dir)
        };

        let runner = MockRunner::new();
        runner.queue_success("0123456789ABCDEF\tfastboot\n"); // fastboot devices
        // Nothing queued for getvar all: the query fails.
        let mut session = session_with(
            config,
            runner.clone(),
            MockScanner::empty(),
            MockPrompt::always_confirm(),
        );

        let err = session.fastboot_vars().unwrap_err();
        assert!(matches!(err, FlashError::Exec(_)));

        // The operator owns transitions; the device stays in fastboot.
        let log = runner.invocations();
        assert_eq!(log.last().unwrap().args_ref(), ["getvar", "all"]);
        assert!(log.iter().all(|i| i.args_ref() != ["reboot"]));
    }

    #[test]
    fn test_active_slot_queries() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = test_config(&dir);
        let runner = MockRunner::new();
        let session = session_with(
            config,
            runner.clone(),
            MockScanner::empty(),
            MockPrompt::always_confirm(),
        );

        runner.queue_success(""); // adb wait-for-device
        runner.queue_success("_a\n");
        assert_eq!(session.active_slot(), Some(SlotSuffix::A));

        // fastboot reports on stderr, without the underscore.
        runner.queue_outcome(Ok(CommandOutput {
            stdout: String::new(),
            stderr: "current-slot: b\nFinished. Total time: 0.002s\n".to_string(),
            exit_code: Some(0),
        }));
        assert_eq!(session.active_slot_from_fastboot(), Some(SlotSuffix::B));

        // No slot line at all.
        runner.queue_success("everything else\n");
        assert_eq!(session.active_slot_from_fastboot(), None);
    }

    #[test]
    fn test_device_model_trims_and_degrades() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = test_config(&dir);
        let runner = MockRunner::new();
        let session = session_with(
            config,
            runner.clone(),
            MockScanner::empty(),
            MockPrompt::always_confirm(),
        );

        runner.queue_success(""); // adb wait-for-device
        runner.queue_success("Pixel 7 Pro\n");
        assert_eq!(session.device_model(), Some("Pixel 7 Pro".to_string()));

        runner.queue_success(""); // adb wait-for-device
        runner.queue_success("\n");
        assert_eq!(session.device_model(), None);

        // Nothing queued: the ADB wait fails and the query never runs.
        runner.clear_invocations();
        assert_eq!(session.device_model(), None);
        assert_eq!(runner.invocations().len(), 1);
    }

    #[test]
    fn test_normal_mode_queries_gate_on_adb() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = test_config(&dir);
        let runner = MockRunner::new();
        let session = session_with(
            config,
            runner.clone(),
            MockScanner::empty(),
            MockPrompt::always_confirm(),
        );

        runner.queue_success(""); // adb wait-for-device
        runner.queue_success("Pixel 7 Pro\n");
        session.device_model().unwrap();

        let log = runner.invocations();
        assert_eq!(log[0].args_ref(), ["wait-for-device"]);
        assert_eq!(log[1].args_ref(), ["shell", "getprop", "ro.product.model"]);

        runner.clear_invocations();
        runner.queue_success(""); // adb wait-for-device
        runner.queue_success("_b\n");
        session.active_slot().unwrap();
        assert_eq!(runner.invocations()[0].args_ref(), ["wait-for-device"]);
    }

    #[test]
    fn test_cancelled_wait_surfaces_as_cancellation() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = test_config(&dir);
        let runner = MockRunner::new();
        let session = session_with(
            config,
            runner.clone(),
            MockScanner::empty(),
            MockPrompt::always_confirm(),
        );

        session.cancel_token().cancel();
        let err = session.wait_for_fastboot().unwrap_err();
        assert!(matches!(err, FlashError::Cancelled(_)));
        // Cancelled before the first poll.
        assert!(runner.invocations().is_empty());
    }

    #[test]
    fn test_dump_partition_full_flow() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = test_config(&dir);
        stage_loader(&config);
        stage_vendor_tools(&config);

        let runner = MockRunner::new();
        runner.queue_success(""); // QSaharaServer
        runner.queue_success(""); // fh_loader
        let mut session = session_with(
            config.clone(),
            runner.clone(),
            MockScanner::fixed(vec![edl_port("COM9")]),
            MockPrompt::always_confirm(),
        );

        let output = dir.path().join("dumps").join("modemst1.img");
        session
            .dump_partition(&output, &PartitionTarget::new(4, "2048", "0"))
            .unwrap();

        let log = runner.invocations();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].program_name(), "QSaharaServer.exe");
        assert_eq!(&log[0].args_ref()[..2], ["-p", r"\\.\COM9"]);
        assert_eq!(log[1].program_name(), "fh_loader.exe");
        assert!(
            log[1]
                .args_ref()
                .iter()
                .any(|a| a == "--convertprogram2read")
        );
    }

    /// Observer double that keeps every event for inspection.
    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<EdlEvent>>,
    }

    impl EdlObserver for RecordingObserver {
        fn on_event(&self, event: &EdlEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn test_failed_flow_publishes_the_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = test_config(&dir);
        stage_loader(&config);
        stage_vendor_tools(&config);

        let observer = Arc::new(RecordingObserver::default());
        // Nothing queued: the programmer upload fails to launch.
        let mut session = DeviceSession::with_parts(
            config,
            MockRunner::new(),
            MockScanner::fixed(vec![edl_port("COM7")]),
            MockPrompt::always_confirm(),
            observer.clone(),
        );

        let err = session
            .dump_partition(Path::new("out.img"), &PartitionTarget::new(0, "0", "0"))
            .unwrap_err();

        let events = observer.events.lock().unwrap();
        match events.last().unwrap() {
            EdlEvent::Error { message } => assert_eq!(message, &err.to_string()),
            other => panic!("expected a terminal error event, got {other:?}"),
        }
        assert!(!events.iter().any(|e| matches!(e, EdlEvent::Complete)));
    }
}
