/*
 *   Copyright (c) 2023-2025 R3BL LLC
 *   All rights reserved.
 *
 *   Licensed under the Apache License, Version 2.0 (the "License");
 *   you may not use this file except in compliance with the License.
 *   You may obtain a copy of the License at
 *
 *   http://www.apache.org/licenses/LICENSE-2.0
 *
 *   Unless required by applicable law or agreed to in writing, software
 *   distributed under the License is distributed on an "AS IS" BASIS,
 *   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *   See the License for the specific language governing permissions and
 *   limitations under the License.
 */

use rc_cmdr::rc::run_app;
use rc_core::RcError;

// The global allocator is set once, in `rc_core::lib`; a binary linking
// against it must not declare a second one.

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Runtime::new().expect("failed to start the tokio runtime");
    let result = runtime.block_on(run_app());

    if let Err(err) = result {
        match err {
            RcError::Cancelled(signal) => signal.reraise_on_self(),
            other => {
                let exit_code = other.exit_code();
                eprintln!("{:?}", miette::Report::new(other));
                std::process::exit(exit_code);
            }
        }
    }
}
