mod artifact;

pub use artifact::MavenArtifact;

/// Well-known Maven repositories used by the loader ecosystems.
pub const MOJANG_LIBRARIES: &str = "https://libraries.minecraft.net";
pub const FORGE_MAVEN: &str = "https://maven.minecraftforge.net";

/// Group id of the bytecode library every loader ships its own copy of.
pub const ASM_GROUP: &str = "org.ow2.asm";
