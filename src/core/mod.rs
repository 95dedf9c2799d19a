// ─── Blocklaunch Core ───
// Loader-aware launch pipeline for Minecraft.
//
// Architecture:
//   core/
//     version/     Version catalog, version JSON, base bootstrap, profile reconciliation
//     maven/       Artifact coordinates and repository URLs
//     downloader/  Concurrent downloads with SHA-1 validation
//     assets/      Asset index + object downloads
//     loaders/     Fabric and Quilt (metadata profiles), Forge (installer)
//     launch/      Options, orchestration, process backend, failure classification
//     java/        Runtime discovery and managed runtime downloads
//     auth/        Offline launch identity

pub mod assets;
pub mod auth;
pub mod downloader;
pub mod error;
pub mod http;
pub mod java;
pub mod launch;
pub mod loaders;
pub mod maven;
pub mod version;
