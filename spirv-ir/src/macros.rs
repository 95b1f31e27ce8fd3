// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

macro_rules! impl_error {
    (
        $(#[doc = $doc:expr])*
        #[display = $display:literal]
        pub struct $name:ident {
            $(
                $(#[doc = $member_doc:expr])*
                pub $member_name:ident: $member_ty:ty,
            )*
        }
    ) => {
        $(#[doc = $doc])*
        #[derive(Clone, Eq, PartialEq, Debug)]
        pub struct $name {
            $(
                $(#[doc = $member_doc])*
                pub $member_name: $member_ty,
            )*
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
                write!(
                    f,
                    $display,
                    $($member_name = self.$member_name,)*
                )
            }
        }
    };
    (
        $(#[doc = $doc:expr])*
        #[display = $display:literal]
        pub struct $name:ident;
    ) => {
        $(#[doc = $doc])*
        #[derive(Clone, Eq, PartialEq, Debug)]
        pub struct $name;

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
                write!(f, $display)
            }
        }
    };
}

macro_rules! impl_error_enum {
    (
        $(#[doc = $doc:expr])*
        pub enum $enum_name:ident {
            $($error:ident($wrapped_error:ty),)+
        }
    ) => {
        $(
            impl From<$wrapped_error> for $enum_name {
                fn from(v: $wrapped_error) -> Self {
                    $enum_name::$error(v)
                }
            }
        )+

        $(#[doc = $doc])*
        #[derive(Clone, Eq, PartialEq, Debug)]
        pub enum $enum_name {
            $(
                #[allow(missing_docs)]
                $error($wrapped_error),
            )+
        }

        impl core::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
                match self {
                    $(
                        Self::$error(v) => core::fmt::Display::fmt(v, f),
                    )+
                }
            }
        }
    };
}
