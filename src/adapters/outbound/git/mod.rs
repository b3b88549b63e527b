/// Git adapters for the package-set source mirror
mod git_mirror;

pub use git_mirror::GitMirror;
