//! `build_images`: docker build and push for configured images.

use crate::config::ImageConfig;
use crate::context::ExecutionContext;
use crate::engine::ImageBuilder;
use crate::error::{Error, Result};
use crate::utils::args::{select, ArgSpec, ParsedArgs};

const BUILD_IMAGES_ARGS: ArgSpec<'static> = ArgSpec {
    command: "build_images",
    switches: &["all", "skip-push", "force-rebuild"],
    options: &["tag", "build-arg"],
};

pub const DEFAULT_TAG: &str = "latest";
const DOCKER: &str = "docker";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildOptions {
    pub tags: Vec<String>,
    pub build_args: Vec<(String, String)>,
    pub skip_push: bool,
    pub no_cache: bool,
}

impl BuildOptions {
    fn from_args(parsed: &ParsedArgs) -> Result<Self> {
        let build_args = parsed
            .option_values("build-arg")
            .iter()
            .map(|pair| {
                pair.split_once('=')
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .ok_or_else(|| {
                        Error::validation_invalid_argument(
                            "build-arg",
                            format!("build_images: --build-arg expects KEY=VALUE, got '{}'", pair),
                            Some(pair.clone()),
                            None,
                        )
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            tags: parsed.option_values("tag").to_vec(),
            build_args,
            skip_push: parsed.switch("skip-push"),
            no_cache: parsed.switch("force-rebuild"),
        })
    }
}

/// Fully qualified references (`image:tag`) an image is built as.
pub fn image_refs(image: &ImageConfig, options: &BuildOptions) -> Vec<String> {
    let tags: Vec<&str> = if !options.tags.is_empty() {
        options.tags.iter().map(String::as_str).collect()
    } else if !image.tags.is_empty() {
        image.tags.iter().map(String::as_str).collect()
    } else {
        vec![DEFAULT_TAG]
    };
    tags.into_iter()
        .map(|tag| format!("{}:{}", image.image, tag))
        .collect()
}

/// Arguments for `docker build` of one image.
pub fn docker_build_args(
    ctx: &ExecutionContext,
    image: &ImageConfig,
    options: &BuildOptions,
) -> Vec<String> {
    let context = ctx.resolve_path(image.context.as_deref().unwrap_or("."));
    let dockerfile = match &image.dockerfile {
        Some(path) => ctx.resolve_path(path),
        None => context.join("Dockerfile"),
    };

    let mut args = vec![
        "build".to_string(),
        "--file".to_string(),
        dockerfile.to_string_lossy().to_string(),
    ];
    for reference in image_refs(image, options) {
        args.push("--tag".to_string());
        args.push(reference);
    }

    let mut build_args: Vec<(&String, &String)> = image.build_args.iter().collect();
    build_args.sort();
    let overrides = options.build_args.iter().map(|(k, v)| (k, v));
    for (key, value) in build_args.into_iter().chain(overrides) {
        args.push("--build-arg".to_string());
        args.push(format!("{}={}", key, value));
    }

    if options.no_cache {
        args.push("--no-cache".to_string());
    }
    args.push(context.to_string_lossy().to_string());
    args
}

pub fn build_image(
    ctx: &ExecutionContext,
    name: &str,
    image: &ImageConfig,
    options: &BuildOptions,
) -> Result<()> {
    ctx.log().info(format!("Building image {} ({})", name, image.image));

    let fail = |err: Error| {
        if err.is_cancelled() {
            err
        } else {
            Error::build_failed(name, err.message)
        }
    };

    ctx.run_command(DOCKER, &docker_build_args(ctx, image, options))
        .map_err(fail)?;

    if options.skip_push {
        ctx.log().debug(format!("Skip pushing {}", name));
    } else {
        for reference in image_refs(image, options) {
            ctx.run_command(DOCKER, &["push".to_string(), reference])
                .map_err(fail)?;
        }
    }

    ctx.log().done(format!("Built image {}", name));
    Ok(())
}

pub struct DockerBuilder;

impl ImageBuilder for DockerBuilder {
    fn build_images(&self, ctx: &ExecutionContext, args: &[String]) -> Result<()> {
        let parsed = BUILD_IMAGES_ARGS.parse(args)?;
        let options = BuildOptions::from_args(&parsed)?;
        let config = ctx.config();

        for (name, image) in select(&config.images, &parsed, Error::image_not_found)? {
            ctx.check_cancelled()?;
            build_image(ctx, name, image, &options)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectConfig;
    use crate::context::test_support::context;
    use crate::log::Logger;
    use std::path::Path;

    fn image() -> ImageConfig {
        let mut image = ImageConfig {
            image: "registry.local/shop/api".to_string(),
            context: Some("api".to_string()),
            ..Default::default()
        };
        image
            .build_args
            .insert("RUST_VERSION".to_string(), "1.80".to_string());
        image
    }

    #[test]
    fn refs_prefer_flag_tags_then_config_then_latest() {
        let mut img = image();
        assert_eq!(
            image_refs(&img, &BuildOptions::default()),
            vec!["registry.local/shop/api:latest"]
        );

        img.tags = vec!["v1".to_string()];
        assert_eq!(
            image_refs(&img, &BuildOptions::default()),
            vec!["registry.local/shop/api:v1"]
        );

        let options = BuildOptions {
            tags: vec!["dev".to_string()],
            ..Default::default()
        };
        assert_eq!(image_refs(&img, &options), vec!["registry.local/shop/api:dev"]);
    }

    #[test]
    fn build_args_resolve_paths_against_working_dir() {
        let ctx = context(ProjectConfig::default(), Path::new("/work"), Logger::discard());
        let options = BuildOptions {
            build_args: vec![("PROFILE".to_string(), "release".to_string())],
            no_cache: true,
            ..Default::default()
        };

        let args = docker_build_args(&ctx, &image(), &options);
        assert_eq!(
            args,
            vec![
                "build",
                "--file",
                "/work/api/Dockerfile",
                "--tag",
                "registry.local/shop/api:latest",
                "--build-arg",
                "RUST_VERSION=1.80",
                "--build-arg",
                "PROFILE=release",
                "--no-cache",
                "/work/api",
            ]
        );
    }

    #[test]
    fn malformed_build_arg_is_rejected() {
        let parsed = BUILD_IMAGES_ARGS
            .parse(&["--build-arg".to_string(), "NOVALUE".to_string()])
            .unwrap();
        let err = BuildOptions::from_args(&parsed).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::ValidationInvalidArgument);
    }

    #[test]
    fn unknown_image_fails_before_building() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(ProjectConfig::default(), dir.path(), Logger::discard());
        let err = DockerBuilder
            .build_images(&ctx, &["ghost".to_string()])
            .unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::ImageNotFound);
    }
}
