//! Scripted stand-in for the `adb` executable.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use device_link::process::{CommandLine, ProcessOutput, ProcessRunner};
use device_link::{Adb, AdbConfig, Error, Result};

/// Mutable script shared between a test and its [`FakeAdb`].
#[derive(Default)]
pub struct Script {
    /// Output of `adb devices`.
    pub devices: String,
    /// `getprop ro.product.model` output per serial.
    pub models: HashMap<String, String>,
    /// Subcommands (first non-`-s` argument) that exit with status 1.
    pub failing: HashSet<String>,
    /// Pretend the executable does not exist.
    pub missing: bool,
    /// Active forwards as (serial, local, remote).
    pub forwards: Vec<(String, String, String)>,
    /// Every invocation's arguments.
    pub calls: Vec<Vec<String>>,
}

/// [`ProcessRunner`] answering from a [`Script`].
#[derive(Clone, Default)]
pub struct FakeAdb {
    pub script: Arc<Mutex<Script>>,
}

impl FakeAdb {
    pub fn with_devices(devices: &str) -> Self {
        let fake = Self::default();
        fake.set_devices(devices);
        fake
    }

    pub fn set_devices(&self, devices: &str) {
        self.script.lock().unwrap().devices = devices.to_string();
    }

    pub fn set_model(&self, serial: &str, raw: &str) {
        self.script
            .lock()
            .unwrap()
            .models
            .insert(serial.to_string(), raw.to_string());
    }

    pub fn fail(&self, subcommand: &str) {
        self.script
            .lock()
            .unwrap()
            .failing
            .insert(subcommand.to_string());
    }

    pub fn recover(&self, subcommand: &str) {
        self.script.lock().unwrap().failing.remove(subcommand);
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.script.lock().unwrap().calls.clone()
    }

    /// Number of `getprop` invocations for `serial`.
    pub fn model_queries(&self, serial: &str) -> usize {
        self.calls()
            .iter()
            .filter(|args| {
                args.len() > 2 && args[0] == "-s" && args[1] == serial && args[2] == "shell"
            })
            .count()
    }

    pub fn adb(&self) -> Adb<FakeAdb> {
        self.adb_with(AdbConfig::default())
    }

    pub fn adb_with(&self, config: AdbConfig) -> Adb<FakeAdb> {
        Adb::with_runner(config.adb_path("adb"), self.clone())
    }
}

#[async_trait]
impl ProcessRunner for FakeAdb {
    async fn run(&self, command: &CommandLine, capture: Option<usize>) -> Result<ProcessOutput> {
        let mut script = self.script.lock().unwrap();
        if script.missing {
            return Err(Error::MissingBinary(command.to_string()));
        }
        script.calls.push(command.args.clone());

        let (serial, rest) = match command.args.as_slice() {
            [flag, serial, rest @ ..] if flag == "-s" => (Some(serial.clone()), rest.to_vec()),
            rest => (None, rest.to_vec()),
        };
        let rest: Vec<&str> = rest.iter().map(String::as_str).collect();

        if let Some(sub) = rest.first() {
            if script.failing.contains(*sub) {
                return Ok(ProcessOutput::failure(1));
            }
        }

        let mut output = match rest.as_slice() {
            ["start-server"] | ["reconnect", "offline"] => ProcessOutput::success(""),
            ["devices"] => ProcessOutput::success(script.devices.clone()),
            ["shell", "getprop", "ro.product.model"] => {
                match serial.as_ref().and_then(|s| script.models.get(s)) {
                    Some(raw) => ProcessOutput::success(raw.clone()),
                    None => ProcessOutput::failure(1),
                }
            }
            ["forward", "--remove-all"] => {
                let serial = serial.unwrap_or_default();
                script.forwards.retain(|(s, _, _)| *s != serial);
                ProcessOutput::success("")
            }
            ["forward", "--list"] => {
                let listing: String = script
                    .forwards
                    .iter()
                    .map(|(s, l, r)| format!("{s} {l} {r}\n"))
                    .collect();
                ProcessOutput::success(listing)
            }
            ["forward", local, remote] => match serial {
                Some(serial) => {
                    script
                        .forwards
                        .push((serial, local.to_string(), remote.to_string()));
                    ProcessOutput::success("")
                }
                None => ProcessOutput::failure(1),
            },
            _ => ProcessOutput::failure(1),
        };

        if let Some(limit) = capture {
            output.stdout.truncate(limit);
        } else {
            output.stdout.clear();
        }
        Ok(output)
    }
}
