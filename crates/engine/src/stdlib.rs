//! The helper library loaded into every policy set before any provider.

use std::sync::Arc;

use tenet_core::{Consumer, ModuleParser, Provider, ProviderError};

/// Embedded modules, keyed by the path they are loaded under.
const MODULES: &[(&str, &str)] = &[
    ("__tenet__/relations.rego", include_str!("stdlib/relations.rego")),
    ("__tenet__/resources.rego", include_str!("stdlib/resources.rego")),
];

pub struct StandardLibrary<P: ?Sized> {
    parser: Arc<P>,
}

impl<P: ModuleParser + ?Sized> StandardLibrary<P> {
    pub fn new(parser: Arc<P>) -> Self {
        Self { parser }
    }
}

impl<P: ModuleParser + ?Sized> Provider for StandardLibrary<P> {
    fn name(&self) -> &str {
        "standard_library"
    }

    fn provide(&self, consumer: &mut dyn Consumer) -> Result<(), ProviderError> {
        for (path, source) in MODULES {
            let module = self.parser.parse_module(path, source)?;
            consumer.module(path, module)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenet_core::{HeaderScanner, Module, Object, PackagePath};

    #[derive(Default)]
    struct Sink(Vec<Module>);

    impl Consumer for Sink {
        fn module(&mut self, _: &str, module: Module) -> Result<(), ProviderError> {
            self.0.push(module);
            Ok(())
        }

        fn data_document(&mut self, _: &str, _: Object) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    #[test]
    fn embedded_modules_parse() {
        let mut sink = Sink::default();
        StandardLibrary::new(Arc::new(HeaderScanner))
            .provide(&mut sink)
            .unwrap();
        let relations = &sink.0[0];
        assert_eq!(
            relations.package,
            PackagePath::new(["tenet", "internal", "relations"])
        );
        assert!(relations.rules_named("forward").next().is_some());
        assert!(relations.rules_named("backward").next().is_some());
        assert_eq!(sink.0[1].package, PackagePath::new(["tenet"]));
    }
}
