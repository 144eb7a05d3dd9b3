// Copyright (c) 2026 the anopa contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#[macro_use]
extern crate clap;

use std::path::PathBuf;
use std::process;

use ansi_term::Colour::{Green, Red, Yellow};
use clap::{App, ArgMatches};

use anopa_core::{Error, Result};
use anopa_sup::{Opts, Summary};
use anopa_supervisor_client::FifoSupervisorClient;

fn main() {
    env_logger::init();

    let matches = cli().get_matches();
    let code = match run(&matches) {
        Ok(()) => 0,
        Err(e) => {
            println!("{}", Red.paint(e.to_string()));
            e.exit_code()
        }
    };
    process::exit(code);
}

fn cli<'a, 'b>() -> App<'a, 'b> {
    clap_app!(("anopa-sup") =>
        (about: "The runtime scheduler for the anopa service orchestration core")
        (version: env!("CARGO_PKG_VERSION"))
        (@setting SubcommandRequiredElseHelp)
        (@subcommand enable =>
            (about: "Wire services into the repository so a future start picks them up")
            (@arg NAMES: +required +multiple "Service names")
        )
        (@subcommand start =>
            (about: "Load, check, and run the named services to completion")
            (@arg NAMES: +required +multiple "Service names")
            (@arg DRY_FULL: --("dry-full") "Report status only; run nothing")
            (@arg INCLUDE_WANTS: --("include-wants") "Also start soft (`wants`) dependencies")
        )
        (@subcommand stop =>
            (about: "Load, check, and stop the named services to completion")
            (@arg NAMES: +required +multiple "Service names")
            (@arg DRY_FULL: --("dry-full") "Report status only; run nothing")
            (@arg ALL: --all "Stop every active service, not just its dependents")
        )
        (@subcommand status =>
            (about: "Report the persisted status of the named services")
            (@arg NAMES: +required +multiple "Service names")
        )
    )
}

fn run(matches: &ArgMatches) -> Result<()> {
    let repo_root = repo_root()?;

    match matches.subcommand() {
        ("enable", Some(m)) => {
            let names = names_of(m);
            anopa_sup::enable(&names, Opts::default())
        }
        ("start", Some(m)) => {
            let names = names_of(m);
            let opts = Opts {
                dry_full: m.is_present("DRY_FULL"),
                include_wants: m.is_present("INCLUDE_WANTS"),
                ..Opts::default()
            };
            let mut supervisor = FifoSupervisorClient::connect(repo_root.clone())?;
            let summary = anopa_sup::start(&repo_root, &mut supervisor, &names, opts)?;
            print_summary(&summary);
            Ok(())
        }
        ("stop", Some(m)) => {
            let names = names_of(m);
            let opts = Opts {
                dry_full: m.is_present("DRY_FULL"),
                stop_all: m.is_present("ALL"),
                ..Opts::default()
            };
            let mut supervisor = FifoSupervisorClient::connect(repo_root.clone())?;
            let summary = anopa_sup::stop(&repo_root, &mut supervisor, &names, opts)?;
            print_summary(&summary);
            Ok(())
        }
        ("status", Some(m)) => {
            let names = names_of(m);
            let mut supervisor = FifoSupervisorClient::connect(repo_root.clone())?;
            let rows = anopa_sup::status(&repo_root, &mut supervisor, &names)?;
            for (name, status) in rows {
                match status {
                    Some(s) => println!("{name}: {:?} (code {})", s.event, s.code),
                    None => println!("{name}: no status recorded"),
                }
            }
            Ok(())
        }
        _ => unreachable!("clap requires a subcommand"),
    }
}

fn names_of(matches: &ArgMatches) -> Vec<String> {
    matches
        .values_of("NAMES")
        .expect("NAMES is required")
        .map(String::from)
        .collect()
}

fn repo_root() -> Result<PathBuf> {
    anopa_core::env::repo_path().ok_or_else(|| Error::InvalidName {
        name: anopa_core::env::AA_REPO.to_string(),
        reason: "not set",
    })
}

fn print_summary(summary: &Summary) {
    if !summary.succeeded.is_empty() {
        println!("{}", Green.paint(format!("succeeded: {}", summary.succeeded.join(", "))));
    }
    if !summary.failed.is_empty() {
        println!("{}", Red.paint(format!("failed: {}", summary.failed.join(", "))));
    }
    if !summary.timed_out.is_empty() {
        println!("{}", Yellow.paint(format!("timed out: {}", summary.timed_out.join(", "))));
    }
}
