// Copyright 2025 Sushanth (https://github.com/sushanthpy)
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

//! Plugins compiled into the `hookbus` binary.

use chrono::Utc;
use hookbus_core::{EventArgs, Plugin, PluginCatalog, PluginContext, PluginType};
use serde_json::{json, Value};

/// Returns its arguments unchanged.
pub struct PluginEcho;

impl Plugin for PluginEcho {
    fn handle(&self, _event: &str, args: EventArgs) -> Value {
        args.into_value()
    }
}

impl PluginType for PluginEcho {
    const CLASS: &'static str = "PluginEcho";
    const EVENTS: &'static [&'static str] = &["echo"];

    fn create(_ctx: &PluginContext) -> Self {
        PluginEcho
    }
}

/// Reports the event it saw and the current time.
pub struct PluginStamp {
    source: Option<String>,
}

impl Plugin for PluginStamp {
    fn handle(&self, event: &str, _args: EventArgs) -> Value {
        json!({
            "event": event,
            "at": Utc::now().to_rfc3339(),
            "source": self.source,
        })
    }
}

impl PluginType for PluginStamp {
    const CLASS: &'static str = "PluginStamp";
    const EVENTS: &'static [&'static str] = &["stamp", "now"];

    fn create(ctx: &PluginContext) -> Self {
        Self {
            source: ctx.location.as_ref().map(|p| p.display().to_string()),
        }
    }
}

/// Catalog of every built-in plugin.
pub fn builtin_catalog() -> PluginCatalog {
    PluginCatalog::new()
        .with::<PluginEcho>()
        .with::<PluginStamp>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog() {
        let catalog = builtin_catalog();
        assert_eq!(catalog.classes(), vec!["PluginEcho", "PluginStamp"]);
        assert_eq!(
            catalog.get("PluginStamp").unwrap().events(),
            &["stamp".to_string(), "now".to_string()]
        );
    }

    #[test]
    fn test_echo_returns_args() {
        let args = EventArgs::new().with("user", "ada");
        assert_eq!(PluginEcho.handle("echo", args), json!({ "user": "ada" }));
    }

    #[test]
    fn test_stamp_reports_event() {
        let stamp = PluginStamp::create(&PluginContext::new("PluginStamp"));
        let value = stamp.handle("now", EventArgs::new());
        assert_eq!(value["event"], json!("now"));
        assert!(value["at"].is_string());
        assert_eq!(value["source"], Value::Null);
    }
}
