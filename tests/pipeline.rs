//! End-to-end runs of the compile and deploy pipeline against a real static
//! tree on disk.
//!
//! Compilers are `sh` one-liners, so these tests only run on unix. The object
//! store is a mockito server speaking just enough of the S3 REST API.
//!
//! Run with: cargo test --test pipeline

#![cfg(unix)]

use filetime::FileTime;
use static_s3::compilers::SubprocessCompiler;
use static_s3::layout::StaticLayout;
use static_s3::manifest::{BundleKind, BundleManifest};
use static_s3::pipeline::{CompileOptions, ErrorClass, Pipeline};
use static_s3::remote::S3Store;
use static_s3::remote::signing::Credentials;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

const ABC_MD5: &str = "900150983cd24fb0d6963f7d28e17f72";

struct Project {
    _tmp: TempDir,
    root: PathBuf,
}

impl Project {
    fn new(manifest: &str) -> Self {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("static");
        for dir in ["js/templates", "css", "img"] {
            fs::create_dir_all(root.join(dir)).unwrap();
        }
        fs::write(root.join("bundles.toml"), manifest).unwrap();
        Self { _tmp: tmp, root }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    fn write(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.path(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }

    fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.path(rel)).unwrap()
    }

    fn pipeline(&self) -> Pipeline {
        let manifest = BundleManifest::load(&self.path("bundles.toml")).unwrap();
        Pipeline::new(StaticLayout::new(&self.root), manifest)
    }
}

/// A compiler that echoes its input file, run from `dir`.
fn cat(dir: PathBuf) -> SubprocessCompiler {
    SubprocessCompiler::new("sh", dir).with_args(["-c", "cat \"$1\"", "sh"])
}

fn compilers(pipeline: &Pipeline) -> (SubprocessCompiler, SubprocessCompiler) {
    let layout = pipeline.layout();
    (cat(layout.template_dir()), cat(layout.compiled_style_dir()))
}

fn shift_mtime(path: &Path, secs: i64) {
    let now = SystemTime::now();
    let when = if secs < 0 {
        now - Duration::from_secs(secs.unsigned_abs())
    } else {
        now + Duration::from_secs(secs as u64)
    };
    filetime::set_file_mtime(path, FileTime::from_system_time(when)).unwrap();
}

fn mtime(path: &Path) -> SystemTime {
    fs::metadata(path).unwrap().modified().unwrap()
}

fn credentials() -> Credentials {
    Credentials {
        access_key_id: "AKID".into(),
        secret: "secret".into(),
    }
}

// ============================================================================
// Compile
// ============================================================================

#[test]
fn edited_script_rebuilds_bundle() {
    let project = Project::new("[script]\nmain = [\"a.js\", \"b.js\"]\n");
    let a = project.write("js/a.js", "1;");
    let b = project.write("js/b.js", "2;");
    shift_mtime(&a, -100);
    shift_mtime(&b, -100);

    let mut pipeline = project.pipeline();
    let (templates, styles) = compilers(&pipeline);
    pipeline
        .compile(&templates, &styles, CompileOptions::default(), None)
        .unwrap();
    assert_eq!(project.read("bundles/script/main.js"), "1;\n2;\n");

    let a_before = mtime(&a);
    project.write("js/b.js", "3;");
    shift_mtime(&b, 100);

    let report = pipeline
        .compile(&templates, &styles, CompileOptions::default(), None)
        .unwrap();
    assert_eq!(report.built, vec![(BundleKind::Script, "main".to_string())]);
    assert_eq!(project.read("bundles/script/main.js"), "1;\n3;\n");
    assert_eq!(mtime(&a), a_before);
}

#[test]
fn second_compile_is_a_no_op() {
    let project = Project::new(
        "[script]\nmain = [\"a.js\", \"templates/row.hbs\"]\n\n[style]\nsite = [\"site.less\"]\n",
    );
    for rel in ["js/a.js", "js/templates/row.hbs", "css/site.less"] {
        let path = project.write(rel, "x");
        shift_mtime(&path, -100);
    }

    let mut pipeline = project.pipeline();
    let (templates, styles) = compilers(&pipeline);
    let first = pipeline
        .compile(&templates, &styles, CompileOptions::default(), None)
        .unwrap();
    assert_eq!(first.built.len(), 2);

    let artifact = project.path("bundles/style/site.css");
    let built_at = mtime(&artifact);

    let second = pipeline
        .compile(&templates, &styles, CompileOptions::default(), None)
        .unwrap();
    assert!(second.built.is_empty());
    assert_eq!(second.fresh.len(), 2);
    assert_eq!(second.styles_regenerated, 0);
    assert_eq!(mtime(&artifact), built_at);
}

#[test]
fn template_is_compiled_from_templates_dir() {
    let project = Project::new("[script]\nmain = [\"templates/row.hbs\"]\n");
    project.write("js/templates/row.hbs", "<tr></tr>");

    let mut pipeline = project.pipeline();
    let (templates, styles) = compilers(&pipeline);
    pipeline
        .compile(&templates, &styles, CompileOptions::default(), None)
        .unwrap();
    assert_eq!(project.read("bundles/script/main.js"), "<tr></tr>\n");
}

#[test]
fn imported_style_change_rebuilds_importer() {
    let project = Project::new("[style]\nsite = [\"site.less\"]\n");
    let site = project.write("css/site.less", "@import 'parts/buttons.less';");
    let part = project.write("css/parts/buttons.less", ".btn {}");
    shift_mtime(&site, -100);
    shift_mtime(&part, -100);

    let mut pipeline = project.pipeline();
    let (templates, styles) = compilers(&pipeline);
    pipeline
        .compile(&templates, &styles, CompileOptions::default(), None)
        .unwrap();

    project.write("css/parts/buttons.less", ".btn { color: red }");
    shift_mtime(&part, 100);

    let report = pipeline
        .compile(&templates, &styles, CompileOptions::default(), None)
        .unwrap();
    assert_eq!(report.styles_regenerated, 1);
    assert_eq!(report.built, vec![(BundleKind::Style, "site".to_string())]);
    assert_eq!(
        project.read("css/compiled/parts/buttons.less"),
        ".btn { color: red }"
    );
}

#[test]
fn failing_style_compiler_leaves_no_artifact() {
    let project = Project::new("[style]\nsite = [\"site.less\"]\n");
    project.write("css/site.less", "body {}");
    let stale = project.write("bundles/style/site.css", "old");
    shift_mtime(&stale, -1000);

    let mut pipeline = project.pipeline();
    let (templates, _) = compilers(&pipeline);
    let broken = SubprocessCompiler::new("sh", pipeline.layout().compiled_style_dir())
        .with_args(["-c", "echo 'unexpected token' >&2; exit 3", "sh"]);

    let err = pipeline
        .compile(&templates, &broken, CompileOptions::default(), None)
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Compilation);
    assert!(err.to_string().contains("unexpected token"));
    assert!(!stale.exists());
}

#[test]
fn remote_compile_embeds_image_urls() {
    let project = Project::new("[style]\nsite = [\"site.less\"]\n");
    project.write("img/logo.png", "abc");
    project.write("css/site.less", "h1 { background: url({% img \"logo.png\" %}); }");

    let mut pipeline = project.pipeline().with_public_url("https://cdn.example.com/");
    let (templates, styles) = compilers(&pipeline);
    pipeline
        .compile(&templates, &styles, CompileOptions::default(), None)
        .unwrap();
    assert_eq!(
        project.read("bundles/style/site.css"),
        format!("h1 {{ background: url(https://cdn.example.com/img/logo_{ABC_MD5}.png); }}\n")
    );
}

#[test]
fn changed_image_reaches_remote_style_bundle() {
    let project = Project::new("[style]\nsite = [\"site.less\"]\n");
    project.write("img/bg.png", "old");
    let site = project.write("css/site.less", "a{b:url({% img \"bg.png\" %})}");
    shift_mtime(&site, -100);

    let mut pipeline = project.pipeline().with_public_url("https://cdn.example.com");
    let (templates, styles) = compilers(&pipeline);
    pipeline
        .compile(&templates, &styles, CompileOptions::default(), None)
        .unwrap();
    assert!(
        project
            .read("bundles/style/site.css")
            .contains("bg_149603e6c03516362a8da23f624db945.png")
    );

    project.write("img/bg.png", "new");
    let report = pipeline
        .compile(&templates, &styles, CompileOptions::default(), None)
        .unwrap();

    assert_eq!(report.built, vec![(BundleKind::Style, "site".to_string())]);
    assert_eq!(
        project.read("bundles/style/site.css"),
        "a{b:url(https://cdn.example.com/img/bg_22af645d1859cb5ca6da0c484f1f37ea.png)}\n"
    );
}

// ============================================================================
// Deploy
// ============================================================================

#[test]
fn current_image_is_not_uploaded() {
    let project = Project::new("");
    project.write("img/logo.png", "abc");
    let mut server = mockito::Server::new();
    let key = format!("/img/logo_{ABC_MD5}.png");
    let head = server
        .mock("HEAD", key.as_str())
        .with_status(200)
        .with_header("etag", &format!("\"{ABC_MD5}\""))
        .create();
    let put = server.mock("PUT", key.as_str()).expect(0).create();

    let store = S3Store::new(&server.url(), "assets", credentials());
    let mut pipeline = project.pipeline().with_public_url(server.url());
    let report = pipeline.deploy(&store, 2, None).unwrap();

    head.assert();
    put.assert();
    assert!(report.uploaded.is_empty());
    assert_eq!(report.already_current, vec![format!("img/logo_{ABC_MD5}.png")]);
}

#[test]
fn absent_image_and_every_bundle_are_uploaded() {
    let project = Project::new("[script]\nmain = [\"a.js\"]\n");
    project.write("bundles/script/main.js", "abc");
    project.write("img/logo.png", "abc");
    let mut server = mockito::Server::new();
    let image_key = format!("/img/logo_{ABC_MD5}.png");
    let bundle_key = format!("/script/main_{ABC_MD5}.js");
    server.mock("HEAD", image_key.as_str()).with_status(403).create();
    let image_put = server
        .mock("PUT", image_key.as_str())
        .match_header("content-type", "image/png")
        .with_status(200)
        .create();
    let bundle_put = server
        .mock("PUT", bundle_key.as_str())
        .match_header("content-type", "application/javascript")
        .with_status(200)
        .create();

    let store = S3Store::new(&server.url(), "assets", credentials());
    let mut pipeline = project.pipeline().with_public_url(server.url());
    let report = pipeline.deploy(&store, 2, None).unwrap();

    image_put.assert();
    bundle_put.assert();
    assert_eq!(report.uploaded.len(), 2);
    assert!(report.already_current.is_empty());
}

#[test]
fn mismatched_etag_is_a_consistency_error() {
    let project = Project::new("");
    project.write("img/logo.png", "abc");
    let mut server = mockito::Server::new();
    let key = format!("/img/logo_{ABC_MD5}.png");
    server
        .mock("HEAD", key.as_str())
        .with_status(200)
        .with_header("etag", "\"d41d8cd98f00b204e9800998ecf8427e\"")
        .create();
    let put = server.mock("PUT", key.as_str()).expect(0).create();

    let store = S3Store::new(&server.url(), "assets", credentials());
    let mut pipeline = project.pipeline().with_public_url(server.url());
    let err = pipeline.deploy(&store, 1, None).unwrap_err();

    put.assert();
    assert_eq!(err.class(), ErrorClass::Consistency);
}
