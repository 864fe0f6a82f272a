//! 核心宏定义
//!
//! 提供统一的宏来减少代码重复

/// 为结构体实现Default trait的宏
///
/// 使用示例:
/// ```rust
/// use script_bridge::impl_default;
///
/// struct Limits {
///     max_bytes: usize,
///     label: String,
/// }
///
/// impl_default!(Limits {
///     max_bytes: 1024,
///     label: String::from("default"),
/// });
///
/// assert_eq!(Limits::default().max_bytes, 1024);
/// ```
#[macro_export]
macro_rules! impl_default {
    ($struct_name:ident {
        $($field:ident: $value:expr),* $(,)?
    }) => {
        impl Default for $struct_name {
            fn default() -> Self {
                Self {
                    $($field: $value),*
                }
            }
        }
    };
}
