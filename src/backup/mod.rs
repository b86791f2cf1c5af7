pub mod archive;
pub mod backup_config;
pub mod backup_set;
pub mod compress;
pub mod duration;
pub mod file_ext;
pub mod finish;
pub mod promote;
pub mod redacted;
pub mod result_error;
pub mod retention;
pub mod shutdown;
pub mod tiered;
pub mod validate;

macro_rules! function_path {
    () => {
        concat!(module_path!(), "::", function_name!(), " ", file!(), ":", line!())
    };
}

pub(crate) use function_path;
