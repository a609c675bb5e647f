#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::bundler::BuildOptions;
    use crate::compiler::Compiler;
    use crate::fs::{FileSystem, MemoryFileSystem};
    use crate::host::RecordingHost;

    fn pipeline_for(
        files: &[(&str, &str)],
    ) -> (Compiler, Arc<MemoryFileSystem>, Arc<RecordingHost>) {
        let fs = Arc::new(MemoryFileSystem::with_files(
            files.iter().map(|(p, c)| (p.to_string(), c.to_string())),
        ));
        let host = Arc::new(RecordingHost::new());
        (Compiler::new(fs.clone(), host.clone()), fs, host)
    }

    #[tokio::test]
    async fn init_is_idempotent() {
        let (compiler, _fs, _host) = pipeline_for(&[]);
        compiler.init().await.unwrap();
        compiler.init().await.unwrap();
    }

    #[tokio::test]
    async fn execute_and_render_delivers_the_bundle_to_the_host() {
        let (compiler, _fs, host) = pipeline_for(&[(
            "/app.tsx",
            "export default function App() { return null; }\n",
        )]);

        let build = compiler.build(BuildOptions::new("/app.tsx")).await.unwrap();
        compiler.execute_and_render(&build, None).await.unwrap();

        let script = host.last_script().unwrap();
        assert_eq!(script, build.bundle);
        assert!(!script.contains("globalThis.__container ="));
    }

    #[tokio::test]
    async fn execute_and_render_wires_a_custom_container() {
        let (compiler, _fs, host) = pipeline_for(&[(
            "/app.tsx",
            "export default function App() { return null; }\n",
        )]);

        let build = compiler.build(BuildOptions::new("/app.tsx")).await.unwrap();
        compiler
            .execute_and_render(&build, Some("#preview"))
            .await
            .unwrap();

        let script = host.last_script().unwrap();
        assert!(script.starts_with(
            "globalThis.__container = document.querySelector(\"#preview\");\n"
        ));
        assert!(script.ends_with(&build.bundle));
    }

    #[tokio::test]
    async fn hot_reload_drops_and_redefines_one_module() {
        let (compiler, fs, host) = pipeline_for(&[
            (
                "/app.tsx",
                "import { greet } from './util';\nexport default function App() { return greet(); }\n",
            ),
            ("/util.ts", "export function greet() { return 'v1'; }\n"),
        ]);

        let before = compiler.build(BuildOptions::new("/app.tsx")).await.unwrap();
        assert!(before.bundle.contains("v1"));

        fs.write_file("/util.ts", "export function greet() { return 'v2'; }\n")
            .await
            .unwrap();
        compiler.hot_reload("/util.ts").await.unwrap();

        let script = host.last_script().unwrap();
        assert!(script.starts_with("globalThis.__modules.drop(\"/util.ts\");\n"));
        assert!(script.contains("define(\"/util.ts\""));
        assert!(script.contains("v2"));
        // Only the reloaded module is redefined.
        assert!(!script.contains("define(\"/app.tsx\""));

        // The reverse dependency was invalidated; the reloaded module is
        // freshly cached.
        assert!(!compiler.module_compiler().is_cached("/app.tsx"));
        assert!(compiler.module_compiler().is_cached("/util.ts"));

        // Build caches were conservatively dropped: a rebuild recomputes and
        // sees the new source.
        let after = compiler.build(BuildOptions::new("/app.tsx")).await.unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(after.bundle.contains("v2"));
    }

    #[tokio::test]
    async fn invalidate_module_clears_build_memoization() {
        let (compiler, _fs, _host) = pipeline_for(&[(
            "/a.tsx",
            "export default function A() { return null; }\n",
        )]);

        let first = compiler.build(BuildOptions::new("/a.tsx")).await.unwrap();
        compiler.invalidate_module("/a.tsx");
        let second = compiler.build(BuildOptions::new("/a.tsx")).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn stats_reflect_caches_and_registry() {
        let (compiler, _fs, _host) = pipeline_for(&[
            (
                "/app.tsx",
                "import { v } from './util';\nexport default function App() { return v; }\n",
            ),
            ("/util.ts", "export const v = 1;\n"),
        ]);

        compiler.build(BuildOptions::new("/app.tsx")).await.unwrap();
        let stats = compiler.stats();
        assert_eq!(stats.modules, 2);
        assert_eq!(stats.externals, 3);
        assert!(stats
            .dependency_graph
            .get("/app.tsx")
            .unwrap()
            .contains("/util.ts"));

        compiler.clear_cache();
        let stats = compiler.stats();
        assert_eq!(stats.modules, 0);
        assert!(stats.dependency_graph.is_empty());
    }

    #[tokio::test]
    async fn stats_serialize_for_ui_consumption() {
        let (compiler, _fs, _host) = pipeline_for(&[(
            "/a.tsx",
            "export default function A() { return null; }\n",
        )]);
        compiler.build(BuildOptions::new("/a.tsx")).await.unwrap();

        let json = serde_json::to_value(compiler.stats()).unwrap();
        assert_eq!(json["modules"], 1);
        assert_eq!(json["externals"], 3);
        assert!(json["dependencyGraph"].is_object());
    }
}
