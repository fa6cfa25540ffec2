//! procore 构建脚本
//!
//! 这个脚本在编译前运行，负责：
//! 1. 解析 Kernel.toml 配置文件（或 menuconfig 生成的 build/.config）
//! 2. 生成 src/config.rs 中的配置常量

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;

/// 解析 build/.config 文件（简单 key=value 格式）
///
/// 键名形如 `process_nproc=64`，第一个下划线之前是 section 名。
fn parse_dot_config(content: &str) -> toml::Value {
    let mut sections: HashMap<String, HashMap<String, toml::Value>> = HashMap::new();

    for line in content.lines() {
        let line = line.trim();

        // 跳过注释和空行
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some(eq_pos) = line.find('=') else {
            continue;
        };
        let key = &line[..eq_pos];
        let value = line[eq_pos + 1..].trim();

        let Some(underscore_pos) = key.find('_') else {
            continue;
        };
        let section = &key[..underscore_pos];
        let config_key = &key[underscore_pos + 1..];

        let parsed_value = if value == "true" {
            toml::Value::Boolean(true)
        } else if value == "false" {
            toml::Value::Boolean(false)
        } else if let Ok(int_val) = value.parse::<i64>() {
            toml::Value::Integer(int_val)
        } else {
            toml::Value::String(value.to_string())
        };

        sections
            .entry(section.to_string())
            .or_default()
            .insert(config_key.to_string(), parsed_value);
    }

    let mut root_map = toml::map::Map::new();
    for (section_name, section_data) in sections {
        let mut toml_map = toml::map::Map::new();
        for (k, v) in section_data {
            toml_map.insert(k, v);
        }
        root_map.insert(section_name, toml::Value::Table(toml_map));
    }

    toml::Value::Table(root_map)
}

fn get_int(config: &toml::Value, section: &str, key: &str, default: i64) -> i64 {
    config
        .get(section)
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_integer())
        .unwrap_or(default)
}

fn get_str<'a>(config: &'a toml::Value, section: &str, key: &str, default: &'a str) -> &'a str {
    config
        .get(section)
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_str())
        .unwrap_or(default)
}

fn main() {
    println!("cargo:rerun-if-changed=../Kernel.toml");
    println!("cargo:rerun-if-changed=../build/.config");

    // 优先使用 build/.config（menuconfig 生成的配置）
    let config_content = fs::read_to_string("../build/.config")
        .or_else(|_| fs::read_to_string("../Kernel.toml"))
        .unwrap_or_default();

    // 判断配置文件类型：检查是否有 TOML 的 [section] 格式
    let is_toml = config_content.lines().any(|line| {
        let trimmed = line.trim();
        trimmed.starts_with('[') && trimmed.ends_with(']')
    });

    let config = if is_toml {
        toml::from_str(&config_content).expect("配置文件解析失败")
    } else {
        parse_dot_config(&config_content)
    };

    let kernel_name = get_str(&config, "general", "name", "procore");
    let kernel_version = get_str(&config, "general", "version", "0.1.0");
    println!("cargo:rustc-env=CARGO_KERNEL_NAME={}", kernel_name);
    println!("cargo:rustc-env=CARGO_KERNEL_VERSION={}", kernel_version);

    generate_config_code(&config, kernel_name, kernel_version);
}

fn generate_config_code(config: &toml::Value, kernel_name: &str, kernel_version: &str) {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR"));

    let config_header = format!(
        r#"//! procore 配置（自动生成）
//!
//! 此文件由 build.rs 根据 Kernel.toml 自动生成，请勿手动修改

// ============================================================
// 基本信息
// ============================================================

/// 名称
pub const KERNEL_NAME: &str = "{}";

/// 版本
pub const KERNEL_VERSION: &str = "{}";

// ============================================================
// 进程配置
// ============================================================

/// 进程表槽位数
pub const NPROC: usize = {};

/// 每个进程的打开文件表大小
pub const NOFILE: usize = {};

/// 进程名长度（含结尾 0）
pub const PROC_NAME_LEN: usize = {};

/// 内核栈大小（字节）
pub const KSTACK_SIZE: usize = {};

/// PID 上限
pub const PID_MAX: u32 = {};

// ============================================================
// SMP 配置
// ============================================================

/// 最大CPU数量
pub const MAX_CPUS: usize = {};

// ============================================================
// 调度器配置
// ============================================================

/// wakeup 自旋告警阈值
pub const WAKEUP_SPIN_WARN: usize = {};
"#,
        kernel_name,
        kernel_version,
        get_int(config, "process", "nproc", 64),
        get_int(config, "process", "nofile", 16),
        get_int(config, "process", "proc_name_len", 16),
        get_int(config, "process", "kstack_size", 4096),
        get_int(config, "process", "pid_max", 4194304),
        get_int(config, "smp", "max_cpus", 8),
        get_int(config, "scheduler", "wakeup_spin_warn", 1000000),
    );

    let config_file = manifest_dir.join("src").join("config.rs");

    // 只有内容变化时才写入，避免每次编译都更新文件时间戳
    let existing_content = fs::read_to_string(&config_file).unwrap_or_default();
    if existing_content != config_header {
        fs::write(&config_file, &config_header).expect("写入配置文件失败");
    }
}
