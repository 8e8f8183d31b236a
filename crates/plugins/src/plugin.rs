//! Plugin trait and the closure-based `define_plugin` builder.

use std::fmt;

use serde::Serialize;

use crate::api::PluginApi;

/// Identity and ordering constraints of a plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PluginDescriptor {
    pub name: String,
    /// Plugins that must run before this one.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pre: Vec<String>,
    /// Plugins that must run after this one.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub post: Vec<String>,
    /// Plugins that must be registered; they also run before this one.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    /// Plugins that cannot be registered alongside this one.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rivals: Vec<String>,
}

impl PluginDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// A unit of extension. `setup` runs once, in resolved order, and taps the
/// plugin's implementations onto the hooks exposed by [`PluginApi`].
pub trait Plugin: Send + Sync {
    fn descriptor(&self) -> &PluginDescriptor;

    fn setup(&self, api: &mut PluginApi) -> anyhow::Result<()>;

    fn name(&self) -> &str {
        &self.descriptor().name
    }
}

type SetupFn = Box<dyn Fn(&mut PluginApi) -> anyhow::Result<()> + Send + Sync>;

/// Plugin assembled from a descriptor and a setup closure.
pub struct DefinedPlugin {
    descriptor: PluginDescriptor,
    setup: Option<SetupFn>,
}

/// Start building a plugin called `name`.
///
/// ```ignore
/// let plugin = define_plugin("analytics")
///     .post(["trellis:runtime"])
///     .setup(|api| {
///         api.on_after_build(|stats| async move {
///             tracing::info!(assets = stats.assets.len(), "build done");
///             Ok(())
///         });
///         Ok(())
///     });
/// ```
pub fn define_plugin(name: impl Into<String>) -> DefinedPlugin {
    DefinedPlugin {
        descriptor: PluginDescriptor::new(name),
        setup: None,
    }
}

fn names<I, S>(items: I) -> impl Iterator<Item = String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into)
}

impl DefinedPlugin {
    #[must_use]
    pub fn pre<I, S>(mut self, plugins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.descriptor.pre.extend(names(plugins));
        self
    }

    #[must_use]
    pub fn post<I, S>(mut self, plugins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.descriptor.post.extend(names(plugins));
        self
    }

    #[must_use]
    pub fn required<I, S>(mut self, plugins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.descriptor.required.extend(names(plugins));
        self
    }

    #[must_use]
    pub fn rivals<I, S>(mut self, plugins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.descriptor.rivals.extend(names(plugins));
        self
    }

    #[must_use]
    pub fn setup<F>(mut self, setup: F) -> Self
    where
        F: Fn(&mut PluginApi) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.setup = Some(Box::new(setup));
        self
    }
}

impl Plugin for DefinedPlugin {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn setup(&self, api: &mut PluginApi) -> anyhow::Result<()> {
        match &self.setup {
            Some(setup) => setup(api),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for DefinedPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefinedPlugin")
            .field("descriptor", &self.descriptor)
            .field("has_setup", &self.setup.is_some())
            .finish()
    }
}
