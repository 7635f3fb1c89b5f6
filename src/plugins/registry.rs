//! Plugin registry: runs plugin hooks at startup and isolates failures.
//!
//! Plugins load in the order given. A plugin whose hook errors or panics
//! is logged and skipped: none of its routes or handlers are installed,
//! its tasks are aborted, and loading moves on to the next plugin.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use axum::Router;

use crate::api::AppState;

use super::{Installed, Plugin, PluginContext, PluginDescriptor, PluginError, PluginHost};

/// A plugin whose hooks all succeeded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedPlugin {
    pub name: String,
    pub disables_default: bool,
}

/// A plugin that was skipped
#[derive(Debug, Clone)]
pub struct FailedPlugin {
    pub name: String,
    pub error: String,
}

#[derive(Clone, Copy)]
enum Hook {
    InstallRoutes,
    InstallHandlers,
    OnLoad,
}

impl Hook {
    const ALL: [Hook; 3] = [Hook::InstallRoutes, Hook::InstallHandlers, Hook::OnLoad];

    fn name(self) -> &'static str {
        match self {
            Hook::InstallRoutes => "install_routes",
            Hook::InstallHandlers => "install_handlers",
            Hook::OnLoad => "on_load",
        }
    }

    fn run(self, plugin: &dyn Plugin, ctx: &mut PluginContext<'_>) -> Result<(), PluginError> {
        match self {
            Hook::InstallRoutes => plugin.install_routes(ctx),
            Hook::InstallHandlers => plugin.install_handlers(ctx),
            Hook::OnLoad => plugin.on_load(ctx),
        }
    }
}

/// Loaded and failed plugins, in load order
#[derive(Debug, Default)]
pub struct PluginRegistry {
    loaded: Vec<LoadedPlugin>,
    failed: Vec<FailedPlugin>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every descriptor's hooks and return what they installed
    pub fn load(&mut self, descriptors: Vec<PluginDescriptor>, host: &PluginHost) -> Installed {
        self.load_onto(Router::new(), descriptors, host)
    }

    /// Like [`load`](Self::load), but plugin routes are merged onto `base`.
    ///
    /// A plugin whose routes overlap `base` fails with
    /// [`PluginError::RouteConflict`] and the rest keep loading.
    pub fn load_onto(
        &mut self,
        base: Router<Arc<AppState>>,
        descriptors: Vec<PluginDescriptor>,
        host: &PluginHost,
    ) -> Installed {
        let mut installed = Installed {
            router: base,
            ..Installed::default()
        };

        for descriptor in descriptors {
            let name = descriptor.name().to_string();
            match Self::load_one(&descriptor, host, installed) {
                Ok(merged) => {
                    installed = merged;
                    tracing::info!(
                        plugin = %name,
                        disables_default = descriptor.disables_default(),
                        "Plugin loaded"
                    );
                    self.loaded.push(LoadedPlugin {
                        name,
                        disables_default: descriptor.disables_default(),
                    });
                }
                Err((previous, error)) => {
                    installed = previous;
                    tracing::error!(plugin = %name, error = %error, "Plugin failed to load, skipping");
                    self.failed.push(FailedPlugin {
                        name,
                        error: error.to_string(),
                    });
                }
            }
        }

        installed
    }

    /// Whether the built-in topic handler should run
    pub fn should_load_default(&self) -> bool {
        !self.loaded.iter().any(|p| p.disables_default)
    }

    pub fn loaded(&self) -> &[LoadedPlugin] {
        &self.loaded
    }

    pub fn failed(&self) -> &[FailedPlugin] {
        &self.failed
    }

    /// Run one plugin's hooks and fold the result into `installed`.
    ///
    /// On failure `installed` is handed back untouched.
    #[allow(clippy::result_large_err)]
    fn load_one(
        descriptor: &PluginDescriptor,
        host: &PluginHost,
        installed: Installed,
    ) -> Result<Installed, (Installed, PluginError)> {
        let plugin = descriptor.plugin();
        let mut ctx = PluginContext::new(host);

        for hook in Hook::ALL {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| hook.run(plugin, &mut ctx)));
            let error = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => PluginError::Hook {
                    plugin: plugin.name().to_string(),
                    hook: hook.name(),
                    source: Box::new(e),
                },
                Err(payload) => PluginError::Panicked {
                    plugin: plugin.name().to_string(),
                    hook: hook.name(),
                    message: panic_message(payload.as_ref()),
                },
            };
            ctx.into_installed().abort();
            return Err((installed, error));
        }

        let own = ctx.into_installed();
        let Installed {
            router,
            mut handlers,
            mut tasks,
        } = installed;

        // Router::merge panics on overlapping routes
        let base = router.clone();
        let merged = panic::catch_unwind(AssertUnwindSafe(|| base.merge(own.router)));
        let router = match merged {
            Ok(router) => router,
            Err(payload) => {
                for task in own.tasks {
                    task.abort();
                }
                let error = PluginError::RouteConflict {
                    plugin: plugin.name().to_string(),
                    message: panic_message(payload.as_ref()),
                };
                return Err((
                    Installed {
                        router,
                        handlers,
                        tasks,
                    },
                    error,
                ));
            }
        };

        handlers.merge(own.handlers);
        tasks.extend(own.tasks);
        Ok(Installed {
            router,
            handlers,
            tasks,
        })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::plugins::testing;
    use crate::websocket::{Envelope, TopicHandler};
    use async_trait::async_trait;
    use axum::{body::Body, http::Request, routing::get};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tower::util::ServiceExt;

    /// Records the global order in which hooks ran
    struct Probe {
        name: &'static str,
        disable: bool,
        fail_on: Option<&'static str>,
        panic_on: Option<&'static str>,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Probe {
        fn new(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name,
                disable: false,
                fail_on: None,
                panic_on: None,
                log: Arc::clone(log),
            }
        }

        fn step(&self, hook: &str) -> Result<(), PluginError> {
            self.log.lock().unwrap().push(format!("{}:{}", self.name, hook));
            if self.panic_on == Some(hook) {
                panic!("{} exploded", self.name);
            }
            if self.fail_on == Some(hook) {
                return Err(PluginError::Config("bad".to_string()));
            }
            Ok(())
        }
    }

    struct Nothing;

    #[async_trait]
    impl TopicHandler for Nothing {
        async fn on_subscribe(&self, _topic: &str) -> Option<Envelope> {
            None
        }
    }

    impl Plugin for Probe {
        fn name(&self) -> &str {
            self.name
        }

        fn disables_default(&self) -> bool {
            self.disable
        }

        fn install_routes(&self, ctx: &mut PluginContext<'_>) -> Result<(), PluginError> {
            let path = format!("/{}", self.name);
            ctx.route(&path, get(|| async { "hi" }));
            self.step("install_routes")
        }

        fn install_handlers(&self, ctx: &mut PluginContext<'_>) -> Result<(), PluginError> {
            ctx.topic_handler(self.name, Arc::new(Nothing));
            self.step("install_handlers")
        }

        fn on_load(&self, _ctx: &mut PluginContext<'_>) -> Result<(), PluginError> {
            self.step("on_load")
        }
    }

    struct Counting(Arc<AtomicUsize>);

    impl Plugin for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn on_load(&self, _ctx: &mut PluginContext<'_>) -> Result<(), PluginError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_empty_plugin_set_loads_default() {
        let host = testing::host(Config::default()).await;
        let mut registry = PluginRegistry::new();
        registry.load(Vec::new(), &host);

        assert!(registry.should_load_default());
        assert!(registry.loaded().is_empty());
    }

    #[tokio::test]
    async fn test_one_disabling_plugin_suppresses_default() {
        let host = testing::host(Config::default()).await;
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut disabling = Probe::new("b", &log);
        disabling.disable = true;
        let descriptors = vec![
            PluginDescriptor::new(Probe::new("a", &log)),
            PluginDescriptor::new(disabling),
            PluginDescriptor::new(Probe::new("c", &log)),
        ];

        let mut registry = PluginRegistry::new();
        registry.load(descriptors, &host);

        assert!(!registry.should_load_default());
        assert_eq!(registry.loaded().len(), 3);
    }

    #[tokio::test]
    async fn test_plugins_without_disable_keep_default() {
        let host = testing::host(Config::default()).await;
        let log = Arc::new(Mutex::new(Vec::new()));
        let descriptors = vec![
            PluginDescriptor::new(Probe::new("a", &log)),
            PluginDescriptor::new(Probe::new("b", &log)),
        ];

        let mut registry = PluginRegistry::new();
        registry.load(descriptors, &host);

        assert!(registry.should_load_default());
    }

    #[tokio::test]
    async fn test_hooks_run_in_descriptor_order() {
        let host = testing::host(Config::default()).await;
        let log = Arc::new(Mutex::new(Vec::new()));
        let descriptors = vec![
            PluginDescriptor::new(Probe::new("a", &log)),
            PluginDescriptor::new(Probe::new("b", &log)),
        ];

        PluginRegistry::new().load(descriptors, &host);

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "a:install_routes",
                "a:install_handlers",
                "a:on_load",
                "b:install_routes",
                "b:install_handlers",
                "b:on_load",
            ]
        );
    }

    #[tokio::test]
    async fn test_failing_plugin_does_not_stop_later_plugins() {
        let host = testing::host(Config::default()).await;
        let log = Arc::new(Mutex::new(Vec::new()));
        let counter = Arc::new(AtomicUsize::new(0));

        let mut failing = Probe::new("bad", &log);
        failing.fail_on = Some("install_routes");
        let descriptors = vec![
            PluginDescriptor::new(Counting(Arc::clone(&counter))),
            PluginDescriptor::new(failing),
            PluginDescriptor::new(Counting(Arc::clone(&counter))),
        ];

        let mut registry = PluginRegistry::new();
        let installed = registry.load(descriptors, &host);

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(registry.loaded().len(), 2);
        assert_eq!(registry.failed().len(), 1);
        assert_eq!(registry.failed()[0].name, "bad");
        // Remaining hooks of the failed plugin were skipped
        assert_eq!(*log.lock().unwrap(), vec!["bad:install_routes"]);
        // And nothing it registered survived
        assert!(installed.handlers.topic_handler("bad").is_none());
    }

    #[tokio::test]
    async fn test_panicking_plugin_is_isolated() {
        let host = testing::host(Config::default()).await;
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut exploding = Probe::new("boom", &log);
        exploding.panic_on = Some("install_handlers");
        exploding.disable = true;
        let descriptors = vec![
            PluginDescriptor::new(exploding),
            PluginDescriptor::new(Probe::new("ok", &log)),
        ];

        let mut registry = PluginRegistry::new();
        let installed = registry.load(descriptors, &host);

        assert_eq!(registry.loaded()[0].name, "ok");
        assert!(registry.failed()[0].error.contains("boom exploded"));
        // A plugin that failed to load cannot suppress the default
        assert!(registry.should_load_default());
        assert!(installed.handlers.topic_handler("ok").is_some());
        assert!(installed.handlers.topic_handler("boom").is_none());
    }

    #[tokio::test]
    async fn test_failed_plugin_routes_not_installed() {
        let host = testing::host(Config::default()).await;
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut failing = Probe::new("bad", &log);
        failing.fail_on = Some("on_load");
        let descriptors = vec![
            PluginDescriptor::new(Probe::new("good", &log)),
            PluginDescriptor::new(failing),
        ];

        let installed = PluginRegistry::new().load(descriptors, &host);
        let state = crate::api::AppState::for_tests(host);
        let app = installed.router.with_state(state);

        let good = app
            .clone()
            .oneshot(Request::builder().uri("/good").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(good.status(), 200);

        let bad = app
            .oneshot(Request::builder().uri("/bad").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(bad.status(), 404);
    }

    #[tokio::test]
    async fn test_route_conflict_is_a_load_failure() {
        let host = testing::host(Config::default()).await;
        let log = Arc::new(Mutex::new(Vec::new()));
        let descriptors = vec![
            PluginDescriptor::new(Probe::new("same", &log)),
            PluginDescriptor::new(Probe::new("same", &log)),
        ];

        let mut registry = PluginRegistry::new();
        registry.load(descriptors, &host);

        assert_eq!(registry.loaded().len(), 1);
        assert!(registry.failed()[0].error.contains("route conflict"));
    }

    struct Clash;

    impl Plugin for Clash {
        fn name(&self) -> &str {
            "clash"
        }

        fn disables_default(&self) -> bool {
            true
        }

        fn install_routes(&self, ctx: &mut PluginContext<'_>) -> Result<(), PluginError> {
            ctx.route("/health/live", get(|| async { "mine" }));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_core_route_conflict_skips_only_that_plugin() {
        let host = testing::host(Config::default()).await;
        let log = Arc::new(Mutex::new(Vec::new()));
        let descriptors = vec![
            PluginDescriptor::new(Clash),
            PluginDescriptor::new(Probe::new("later", &log)),
        ];

        let mut registry = PluginRegistry::new();
        let installed = registry.load_onto(crate::api::core_routes(false), descriptors, &host);

        assert_eq!(registry.failed()[0].name, "clash");
        assert!(registry.failed()[0].error.contains("route conflict"));
        assert_eq!(registry.loaded()[0].name, "later");
        assert!(registry.should_load_default());

        let app = installed
            .router
            .with_state(crate::api::AppState::for_tests(host));
        let live = app
            .clone()
            .oneshot(Request::builder().uri("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(live.status(), 200);
        let bytes = axum::body::to_bytes(live.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.is_empty());

        let later = app
            .oneshot(Request::builder().uri("/later").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(later.status(), 200);
    }
}
