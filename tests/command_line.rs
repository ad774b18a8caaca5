use std::error::Error;
use std::path::{Path, PathBuf};

use autopatcher::config::EnvironmentSettings;
use autopatcher::errors::PatcherError;
use autopatcher::process::command::effective_shortcut_format;
use autopatcher::process::{
    direct_command, editor_args, intermediary_command, shortcut_uri, CommandLine,
    EditorInvocation,
};
use autopatcher::types::ShortcutFormat;

type TestResult = Result<(), Box<dyn Error>>;

fn launcher_env(format: ShortcutFormat) -> EnvironmentSettings {
    EnvironmentSettings {
        use_intermediary: true,
        intermediary_executable: Some(PathBuf::from("/mo2/ModOrganizer.exe")),
        profile_name: Some("Default".to_string()),
        entry_name: Some("FO4Edit".to_string()),
        shortcut_format: format,
        shortcut_scheme: "moshortcut".to_string(),
        instance_name: None,
        overwrite_dir: None,
    }
}

fn invocation<'a>(
    script_arg: &str,
    flags: &'a [String],
    use_cache: bool,
) -> EditorInvocation<'a> {
    EditorInvocation {
        script_arg: script_arg.to_string(),
        script_dir: Path::new("/xedit/Edit Scripts"),
        log_path: Path::new("/out/logs/job.log"),
        game_data_path: Path::new("/game/Data"),
        game_variant_flag: Some("-FO4"),
        unsafe_edit_flags: flags,
        use_cache,
    }
}

#[test]
fn direct_command_passes_full_script_path() {
    let flags = vec!["-IKnowWhatImDoing".to_string(), "-AllowMasterFilesEdit".to_string()];
    let inv = invocation("/xedit/Edit Scripts/AP_Extract_tag.pas", &flags, false);

    let cmd = direct_command(Path::new("/xedit/FO4Edit.exe"), &inv);

    assert_eq!(cmd.program, PathBuf::from("/xedit/FO4Edit.exe"));
    assert_eq!(
        cmd.args,
        vec![
            "-FO4",
            "-script:/xedit/Edit Scripts/AP_Extract_tag.pas",
            "-S:/xedit/Edit Scripts",
            "-IKnowWhatImDoing",
            "-AllowMasterFilesEdit",
            "-L:/out/logs/job.log",
            "-D:/game/Data",
        ]
    );
    // Arguments stay unquoted; the OS receives them verbatim.
    assert!(cmd.args.iter().all(|a| !a.contains('"')));
}

#[test]
fn cache_flag_and_blank_flags() {
    let flags = vec!["  ".to_string()];
    let mut inv = invocation("x.pas", &flags, true);
    inv.game_variant_flag = Some(" ");

    let args = editor_args(&inv);
    assert_eq!(args.first().map(String::as_str), Some("-script:x.pas"));
    assert_eq!(args.last().map(String::as_str), Some("-cache"));
    assert_eq!(args.len(), 5);
}

#[test]
fn intermediary_command_wraps_editor_args() -> TestResult {
    let flags = Vec::new();
    let inv = invocation("AP_Extract_tag.pas", &flags, false);
    let env = launcher_env(ShortcutFormat::WithColon);

    let cmd = intermediary_command(&env, editor_args(&inv))?;

    assert_eq!(cmd.program, PathBuf::from("/mo2/ModOrganizer.exe"));
    assert_eq!(&cmd.args[..4], ["-p", "Default", "moshortcut://:FO4Edit", "-a"]);
    assert_eq!(cmd.args[5], "-script:AP_Extract_tag.pas");
    Ok(())
}

#[test]
fn intermediary_without_profile_omits_the_flag() -> TestResult {
    let mut env = launcher_env(ShortcutFormat::NoColon);
    env.profile_name = None;

    let cmd = intermediary_command(&env, vec!["-script:a.pas".to_string()])?;
    assert_eq!(cmd.args, vec!["moshortcut://FO4Edit", "-a", "-script:a.pas"]);
    Ok(())
}

#[test]
fn shortcut_uri_forms() -> TestResult {
    assert_eq!(
        shortcut_uri(&launcher_env(ShortcutFormat::NoColon))?,
        "moshortcut://FO4Edit"
    );
    assert_eq!(
        shortcut_uri(&launcher_env(ShortcutFormat::WithColon))?,
        "moshortcut://:FO4Edit"
    );

    let mut env = launcher_env(ShortcutFormat::Instance);
    env.instance_name = Some("Fallout 4".to_string());
    assert_eq!(shortcut_uri(&env)?, "moshortcut://Fallout 4/FO4Edit");

    // A scheme given with its separator is not doubled.
    env.shortcut_scheme = "moshortcut://".to_string();
    assert_eq!(shortcut_uri(&env)?, "moshortcut://Fallout 4/FO4Edit");
    Ok(())
}

#[test]
fn auto_format_follows_instance_name() -> TestResult {
    let mut env = launcher_env(ShortcutFormat::Auto);
    assert_eq!(effective_shortcut_format(&env), ShortcutFormat::WithColon);
    assert_eq!(shortcut_uri(&env)?, "moshortcut://:FO4Edit");

    env.instance_name = Some("Portable".to_string());
    assert_eq!(effective_shortcut_format(&env), ShortcutFormat::Instance);
    assert_eq!(shortcut_uri(&env)?, "moshortcut://Portable/FO4Edit");
    Ok(())
}

#[test]
fn incomplete_launcher_settings_are_config_errors() {
    let env = launcher_env(ShortcutFormat::Instance);
    assert!(matches!(
        shortcut_uri(&env),
        Err(PatcherError::ConfigError(_))
    ));

    let mut env = launcher_env(ShortcutFormat::NoColon);
    env.entry_name = None;
    assert!(matches!(
        shortcut_uri(&env),
        Err(PatcherError::ConfigError(_))
    ));

    let mut env = launcher_env(ShortcutFormat::NoColon);
    env.intermediary_executable = None;
    assert!(matches!(
        intermediary_command(&env, Vec::new()),
        Err(PatcherError::ConfigError(_))
    ));
}

#[test]
fn display_quotes_only_whitespace() {
    let cmd = CommandLine::new(
        "/Program Files/FO4Edit.exe",
        vec!["-S:/a b".to_string(), "-cache".to_string()],
    );
    assert_eq!(
        cmd.display(),
        "\"/Program Files/FO4Edit.exe\" \"-S:/a b\" -cache"
    );
}
